//! Command-line argument surface and interactive slash-command dispatch.
//!
//! Grounded on `ro_agent/cli.py`'s flag set (spec §6); the REPL rendering
//! loop itself stays out of scope, but the flag struct and the slash-command
//! dispatch function are part of the documented external interface.

use clap::Parser;
use std::collections::HashMap;
use std::path::PathBuf;

/// A tool-using LLM agent runtime for OpenAI-compatible chat-completions
/// servers.
#[derive(Debug, Parser)]
#[command(name = "ro-agent", version, about)]
pub struct CliArgs {
    /// One-shot prompt. If omitted, starts an interactive REPL.
    pub prompt_positional: Option<String>,

    #[arg(short = 'm', long)]
    pub model: Option<String>,

    #[arg(long = "base-url")]
    pub base_url: Option<String>,

    /// Raw system prompt text.
    #[arg(short = 's', long)]
    pub system: Option<String>,

    /// Markdown prompt file with optional YAML frontmatter variables.
    #[arg(short = 'p', long)]
    pub prompt: Option<PathBuf>,

    /// `key=value` variable substitution for `--prompt`, repeatable.
    #[arg(long = "var")]
    pub var: Vec<String>,

    /// YAML file of variable substitutions for `--prompt`.
    #[arg(long = "vars-file")]
    pub vars_file: Option<PathBuf>,

    /// Write the final assistant text to this file. Refuses if it exists.
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    #[arg(short = 'w', long = "working-dir")]
    pub working_dir: Option<String>,

    /// Auto-approve every tool call that would otherwise require approval.
    #[arg(short = 'y', long = "auto-approve")]
    pub auto_approve: bool,

    /// Resume a prior conversation by ID, or "latest".
    #[arg(short = 'r', long)]
    pub resume: Option<String>,

    /// List saved conversations and exit.
    #[arg(short = 'l', long)]
    pub list: bool,

    #[arg(long = "preview-lines")]
    pub preview_lines: Option<usize>,

    #[arg(long)]
    pub profile: Option<String>,

    #[arg(long = "shell-mode")]
    pub shell_mode: Option<String>,

    #[arg(long = "file-write-mode")]
    pub file_write_mode: Option<String>,
}

/// Parses a markdown prompt file's optional `---`-delimited YAML
/// frontmatter (default variable values) and returns `(body, defaults)`.
/// A file with no frontmatter returns the whole contents as the body.
pub fn parse_prompt_file(contents: &str) -> crate::Result<(String, HashMap<String, String>)> {
    let Some(rest) = contents.strip_prefix("---\n") else {
        return Ok((contents.to_string(), HashMap::new()));
    };
    let Some(end) = rest.find("\n---") else {
        return Ok((contents.to_string(), HashMap::new()));
    };
    let frontmatter = &rest[..end];
    let body = rest[end + 4..].trim_start_matches('\n').to_string();

    let defaults: HashMap<String, String> = serde_yaml::from_str(frontmatter)?;
    Ok((body, defaults))
}

/// Loads `key=value` pairs from a YAML mapping file.
pub fn load_vars_file(contents: &str) -> crate::Result<HashMap<String, String>> {
    Ok(serde_yaml::from_str(contents)?)
}

/// Parses a single `--var key=value` argument.
pub fn parse_var(arg: &str) -> Option<(String, String)> {
    let (key, value) = arg.split_once('=')?;
    Some((key.trim().to_string(), value.trim().to_string()))
}

/// Merges variable sources in precedence order (later wins): frontmatter
/// defaults, `--vars-file`, then individual `--var` flags.
pub fn merge_vars(
    defaults: HashMap<String, String>,
    vars_file: Option<HashMap<String, String>>,
    cli_vars: &[String],
) -> HashMap<String, String> {
    let mut merged = defaults;
    if let Some(file_vars) = vars_file {
        merged.extend(file_vars);
    }
    for arg in cli_vars {
        if let Some((key, value)) = parse_var(arg) {
            merged.insert(key, value);
        }
    }
    merged
}

/// Substitutes `{{key}}` placeholders in `template` with values from `vars`.
/// Unmatched placeholders are left as-is.
pub fn substitute_vars(template: &str, vars: &HashMap<String, String>) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        result = result.replace(&format!("{{{{{key}}}}}"), value);
    }
    result
}

/// Outcome of dispatching one line of REPL input as a possible slash
/// command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommandResult {
    /// Not a slash command; treat the line as a user message.
    NotACommand,
    /// Latch auto-approve for the rest of the session.
    Approve,
    /// Run compaction, with optional extra guidance text.
    Compact(String),
    Help,
    Clear,
    Exit,
}

const HELP_TEXT: &str = "\
Commands:
  /approve          latch auto-approve for the rest of this session
  /compact [text]   summarize the conversation so far, with optional guidance
  /help             show this message
  /clear            clear conversation history
  exit, quit        end the session";

/// Dispatches one line of interactive input to a slash command, or reports
/// that it isn't one.
pub fn handle_slash_command(line: &str) -> SlashCommandResult {
    let trimmed = line.trim();
    match trimmed {
        "exit" | "quit" => return SlashCommandResult::Exit,
        "/approve" => return SlashCommandResult::Approve,
        "/help" => return SlashCommandResult::Help,
        "/clear" => return SlashCommandResult::Clear,
        _ => {}
    }
    if let Some(guidance) = trimmed.strip_prefix("/compact") {
        return SlashCommandResult::Compact(guidance.trim().to_string());
    }
    SlashCommandResult::NotACommand
}

pub fn help_text() -> &'static str {
    HELP_TEXT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_prompt_file_without_frontmatter() {
        let (body, vars) = parse_prompt_file("Just a plain prompt.").unwrap();
        assert_eq!(body, "Just a plain prompt.");
        assert!(vars.is_empty());
    }

    #[test]
    fn test_parse_prompt_file_with_frontmatter() {
        let contents = "---\nname: World\n---\nHello, {{name}}!";
        let (body, vars) = parse_prompt_file(contents).unwrap();
        assert_eq!(body, "Hello, {{name}}!");
        assert_eq!(vars.get("name"), Some(&"World".to_string()));
    }

    #[test]
    fn test_parse_var_splits_on_equals() {
        assert_eq!(parse_var("key=value"), Some(("key".to_string(), "value".to_string())));
        assert_eq!(parse_var("no-equals"), None);
    }

    #[test]
    fn test_merge_vars_precedence() {
        let mut defaults = HashMap::new();
        defaults.insert("a".to_string(), "default".to_string());
        let mut file_vars = HashMap::new();
        file_vars.insert("a".to_string(), "from-file".to_string());
        let merged = merge_vars(defaults, Some(file_vars), &["a=from-cli".to_string()]);
        assert_eq!(merged.get("a"), Some(&"from-cli".to_string()));
    }

    #[test]
    fn test_substitute_vars_replaces_placeholders() {
        let mut vars = HashMap::new();
        vars.insert("name".to_string(), "World".to_string());
        assert_eq!(substitute_vars("Hello, {{name}}!", &vars), "Hello, World!");
    }

    #[test]
    fn test_handle_slash_command_variants() {
        assert_eq!(handle_slash_command("/approve"), SlashCommandResult::Approve);
        assert_eq!(handle_slash_command("/help"), SlashCommandResult::Help);
        assert_eq!(handle_slash_command("/clear"), SlashCommandResult::Clear);
        assert_eq!(handle_slash_command("exit"), SlashCommandResult::Exit);
        assert_eq!(handle_slash_command("quit"), SlashCommandResult::Exit);
        assert_eq!(handle_slash_command("/compact be terse"), SlashCommandResult::Compact("be terse".to_string()));
        assert_eq!(handle_slash_command("/compact"), SlashCommandResult::Compact(String::new()));
        assert_eq!(handle_slash_command("what's the weather"), SlashCommandResult::NotACommand);
    }
}
