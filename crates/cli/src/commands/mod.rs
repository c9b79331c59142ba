pub mod config;
pub mod doctor;
pub mod migrate;
pub mod seed;

use serde::Serialize;

// Stable exit codes, one per failure class, so operator scripts can branch
// without parsing the JSON payload.
pub const EXIT_OK: u8 = 0;
pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_RUNTIME: u8 = 3;
pub const EXIT_DATABASE: u8 = 4;
pub const EXIT_MIGRATION: u8 = 5;
pub const EXIT_SEED: u8 = 6;

/// What a subcommand hands back to `main`: the process exit code plus the
/// already-rendered stdout line.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct Outcome<'a> {
    command: &'a str,
    status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_class: Option<&'a str>,
    message: &'a str,
}

impl CommandResult {
    pub fn success(command: &str, message: impl AsRef<str>) -> Self {
        let outcome =
            Outcome { command, status: "ok", error_class: None, message: message.as_ref() };
        Self { exit_code: EXIT_OK, output: render(&outcome) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl AsRef<str>,
        exit_code: u8,
    ) -> Self {
        let outcome = Outcome {
            command,
            status: "error",
            error_class: Some(error_class),
            message: message.as_ref(),
        };
        Self { exit_code, output: render(&outcome) }
    }
}

fn render(outcome: &Outcome<'_>) -> String {
    serde_json::to_string(outcome).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"{}\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            outcome.command,
            escape_json(&error.to_string())
        )
    })
}

pub(crate) fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Commands are short-lived one-shot operations, so each runs its async body
/// on a fresh current-thread runtime rather than dragging in a multi-thread
/// executor.
pub(crate) fn block_on<T>(
    future: impl std::future::Future<Output = T>,
) -> Result<T, std::io::Error> {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    Ok(runtime.block_on(future))
}
