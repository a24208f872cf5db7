//! Page automation seam for the remote add-release form.
//!
//! The submission flow drives the form through [`PageAutomation`]; the
//! helpers here compose its primitives into waits and dropdown selection.

use crate::error::DomError;
use crate::resolver::score_match;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// Element-level access to the live form page.
#[async_trait]
pub trait PageAutomation: Send + Sync {
    /// Sets an input's value and fires its change events. False if absent.
    async fn fill_input(&self, selector: &str, value: &str) -> bool;

    async fn exists(&self, selector: &str) -> bool;

    /// Focuses an input and types `text`, triggering autocomplete.
    async fn type_into(&self, selector: &str, text: &str) -> bool;

    /// Texts of currently visible dropdown options.
    async fn option_texts(&self, selector: &str) -> Vec<String>;

    /// Clicks the `index`-th visible option.
    async fn choose_option(&self, selector: &str, index: usize) -> bool;

    async fn input_value(&self, selector: &str) -> Option<String>;

    /// Text content of each present region, in selector order.
    async fn region_texts(&self, selectors: &[String]) -> Vec<String>;

    /// Visible text of the whole page.
    async fn page_text(&self) -> String;
}

/// Delays between successive probes.
#[derive(Debug, Clone)]
pub struct WaitOptions {
    pub schedule: Vec<Duration>,
}

impl WaitOptions {
    pub fn from_millis(schedule: &[u64]) -> Self {
        Self {
            schedule: schedule.iter().copied().map(Duration::from_millis).collect(),
        }
    }
}

/// Turns offsets from a common start into successive delays.
pub fn offsets_to_delays(offsets: &[u64]) -> Vec<Duration> {
    let mut previous = 0;
    offsets
        .iter()
        .map(|&offset| {
            let delay = offset.saturating_sub(previous);
            previous = previous.max(offset);
            Duration::from_millis(delay)
        })
        .collect()
}

/// Sleeps through `schedule`, probing after each delay, until a probe
/// yields a value.
pub async fn poll_with_schedule<T, F, Fut>(schedule: &[Duration], mut probe: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    for delay in schedule {
        tokio::time::sleep(*delay).await;
        if let Some(value) = probe().await {
            return Some(value);
        }
    }
    None
}

/// Waits until `selector` exists, checking once before the schedule starts.
pub async fn wait_for(
    page: &dyn PageAutomation,
    selector: &str,
    options: &WaitOptions,
) -> Result<(), DomError> {
    if page.exists(selector).await {
        return Ok(());
    }

    poll_with_schedule(&options.schedule, move || async move {
        page.exists(selector).await.then_some(())
    })
    .await
    .ok_or_else(|| DomError::ElementNotFound(selector.to_string()))
}

/// Selectors taking part in a search-as-you-type dropdown.
#[derive(Debug, Clone, Copy)]
pub struct DropdownFields<'a> {
    pub input: &'a str,
    /// Hidden field the site fills once an option is chosen.
    pub companion: &'a str,
    pub option: &'a str,
}

/// Types `text` into a dropdown input, picks the best-scoring option and
/// waits for the companion field to confirm it. Returns the chosen text.
pub async fn fill_search_dropdown(
    page: &dyn PageAutomation,
    fields: DropdownFields<'_>,
    text: &str,
    options: &WaitOptions,
) -> Result<String, DomError> {
    if !page.type_into(fields.input, text).await {
        return Err(DomError::ElementNotFound(fields.input.to_string()));
    }

    let choices = poll_with_schedule(&options.schedule, move || async move {
        let choices = page.option_texts(fields.option).await;
        (!choices.is_empty()).then_some(choices)
    })
    .await
    .ok_or_else(|| DomError::OptionNotFound(text.to_string()))?;

    let (index, chosen, score) = choices
        .iter()
        .enumerate()
        .map(|(i, choice)| (i, choice, score_match(text, choice)))
        .fold(None, |best: Option<(usize, &String, f64)>, current| match best {
            Some(b) if b.2 >= current.2 => Some(b),
            _ => Some(current),
        })
        .ok_or_else(|| DomError::OptionNotFound(text.to_string()))?;

    if score <= 0.0 || !page.choose_option(fields.option, index).await {
        return Err(DomError::OptionNotFound(text.to_string()));
    }
    let chosen = chosen.clone();

    let confirmed = move || async move {
        page.input_value(fields.companion)
            .await
            .filter(|v| !v.trim().is_empty())
    };

    if confirmed().await.is_some()
        || poll_with_schedule(&options.schedule, confirmed)
            .await
            .is_some()
    {
        Ok(chosen)
    } else {
        Err(DomError::NotConfirmed(fields.input.to_string()))
    }
}
