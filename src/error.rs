use anyhow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Provider,
    Knowledge,
    Pipeline,
    Input,
    Internal,
}

impl ErrorCategory {
    pub fn code(self) -> &'static str {
        match self {
            ErrorCategory::Provider => "PROVIDER",
            ErrorCategory::Knowledge => "KNOWLEDGE",
            ErrorCategory::Pipeline => "PIPELINE",
            ErrorCategory::Input => "INPUT",
            ErrorCategory::Internal => "INTERNAL",
        }
    }

    pub fn hint(self) -> &'static str {
        match self {
            ErrorCategory::Provider => {
                "Set the provider API key (for example OPENAI_API_KEY) or point the profile at a \
                 local generic endpoint."
            }
            ErrorCategory::Knowledge => {
                "Check knowledge_path in sqlporter.toml; the store degrades to empty on read but \
                 the path must be writable to learn rules."
            }
            ErrorCategory::Pipeline => {
                "Re-run with --log-filter debug for per-agent dispatch and refinement logs."
            }
            ErrorCategory::Input => {
                "Run sqlporter --help and correct command arguments or directory paths."
            }
            ErrorCategory::Internal => {
                "Retry with --log-filter debug. If it persists, capture logs and open an issue."
            }
        }
    }
}

pub fn categorize_error(err: &anyhow::Error) -> ErrorCategory {
    let msg = format!("{err:#}").to_ascii_lowercase();

    if msg.contains("api key") || msg.contains("provider") || msg.contains("unreachable") {
        return ErrorCategory::Provider;
    }

    if msg.contains("--agent-model")
        || msg.contains("input directory")
        || msg.contains("invalid value")
        || msg.contains("profile")
        || msg.contains("config file")
    {
        return ErrorCategory::Input;
    }

    if msg.contains("knowledge") {
        return ErrorCategory::Knowledge;
    }

    if msg.contains("dispatch") || msg.contains("synthesis") || msg.contains("evaluat") {
        return ErrorCategory::Pipeline;
    }

    ErrorCategory::Internal
}

pub fn format_cli_error(err: &anyhow::Error) -> String {
    let category = categorize_error(err);
    format!("[{}] {err:#}\nHint: {}", category.code(), category.hint())
}
