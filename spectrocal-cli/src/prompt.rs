//! Operator prompts for the collection loop.

use {
    crate::CliError,
    anyhow::Result,
    dialoguer::{Error as DialoguerError, Input, Select, theme::ColorfulTheme},
    std::io::IsTerminal,
};

/// Device models offered at the device prompt.
pub const DEVICE_MODELS: &[&str] = &["spectro-one", "spectro-one-pro"];

/// Batch labels offered at the metric prompt.
pub const METRICS: &[&str] = &["passes", "fails"];

const OTHER: &str = "other...";

/// What the operator wants after a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextAction {
    /// Scan the next instrument.
    Scan,
    /// Leave the collection loop.
    Quit,
}

impl NextAction {
    /// Interpret a line typed at the "ready" prompt.
    pub fn from_input(input: &str) -> Self {
        if input.trim().eq_ignore_ascii_case("q") {
            Self::Quit
        } else {
            Self::Scan
        }
    }
}

pub fn ensure_interactive_terminal() -> Result<()> {
    if std::io::stdin().is_terminal() && std::io::stderr().is_terminal() {
        Ok(())
    } else {
        Err(CliError::Usage(
            "collect is interactive and requires a terminal; use query for one-shot reads".to_string(),
        )
        .into())
    }
}

fn map_prompt_error(err: DialoguerError) -> anyhow::Error {
    match err {
        DialoguerError::IO(io_err) => {
            if io_err.kind() == std::io::ErrorKind::Interrupted {
                CliError::Cancelled("prompt cancelled".to_string()).into()
            } else {
                CliError::Usage(format!("prompt failed: {io_err}")).into()
            }
        },
    }
}

/// Pick one of `choices`, or type a free-form value.
fn choose(prompt: &str, choices: &[&str], default: Option<&str>) -> Result<String> {
    let mut items: Vec<&str> = choices.to_vec();
    if let Some(default) = default {
        if !items.contains(&default) {
            items.insert(0, default);
        }
    }
    items.push(OTHER);

    let initial = default
        .and_then(|d| items.iter().position(|item| *item == d))
        .unwrap_or(0);

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .items(&items)
        .default(initial)
        .interact_opt()
        .map_err(map_prompt_error)?;

    match selection.map(|index| items[index]) {
        Some(item) if item == OTHER => Input::<String>::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .interact_text()
            .map(|value| value.trim().to_string())
            .map_err(map_prompt_error),
        Some(item) => Ok(item.to_string()),
        None => Err(CliError::Cancelled("selection cancelled".to_string()).into()),
    }
}

/// Ask which device model is being collected.
pub fn ask_device(default: Option<&str>) -> Result<String> {
    choose("Device being connected", DEVICE_MODELS, default)
}

/// Ask whether this batch is passes or fails.
pub fn ask_metric(default: Option<&str>) -> Result<String> {
    choose("Are these fails or passes?", METRICS, default)
}

/// Wait for the operator to plug in the next instrument.
pub fn wait_for_operator() -> Result<NextAction> {
    let input = Input::<String>::with_theme(&ColorfulTheme::default())
        .with_prompt("Plug in UART board and instrument, then press Enter (q to exit)")
        .allow_empty(true)
        .interact_text()
        .map_err(map_prompt_error)?;
    Ok(NextAction::from_input(&input))
}

/// Reject names that would escape the export directory.
pub fn validate_label(kind: &str, value: &str) -> Result<()> {
    if value.is_empty() || value.contains(['/', '\\']) || value == "." || value == ".." {
        return Err(CliError::Usage(format!("invalid {kind} name: {value:?}")).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_action_from_input() {
        assert_eq!(NextAction::from_input(""), NextAction::Scan);
        assert_eq!(NextAction::from_input("anything"), NextAction::Scan);
        assert_eq!(NextAction::from_input("q"), NextAction::Quit);
        assert_eq!(NextAction::from_input(" Q \n"), NextAction::Quit);
    }

    #[test]
    fn test_validate_label() {
        assert!(validate_label("device", "spectro-one").is_ok());
        assert!(validate_label("metric", "passes").is_ok());

        for bad in ["", ".", "..", "a/b", "a\\b"] {
            let err = validate_label("device", bad).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<CliError>(),
                Some(CliError::Usage(_))
            ));
        }
    }

    #[test]
    fn test_prompt_interrupt_maps_to_cancelled() {
        let err = map_prompt_error(DialoguerError::IO(std::io::Error::from(
            std::io::ErrorKind::Interrupted,
        )));
        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::Cancelled(_))
        ));
    }
}
