//! Binary entry point: wires the CLI surface (spec §6) to the library's
//! [`ro_agent_core::Agent`]. The REPL's line-reading loop lives here since
//! it's pure terminal plumbing; everything it calls into (profile loading,
//! prompt-file parsing, slash-command dispatch, conversation persistence) is
//! library code.

use clap::Parser;
use ro_agent_core::capability::factory::{create_registry_from_profile, load_profile};
use ro_agent_core::cli::{self, CliArgs, SlashCommandResult};
use ro_agent_core::observability::ObservabilityConfig;
use ro_agent_core::{
    config, Agent, AgentEvent, AgentInfo, ConversationStore, ModelClient, ObservabilityProcessor, Session,
    SignalManager, TelemetryContext,
};
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn print_event(event: &AgentEvent) {
    match event {
        AgentEvent::Text { content } => {
            print!("{content}");
            let _ = io::stdout().flush();
        }
        AgentEvent::ToolStart { tool_name, .. } => {
            println!("\n[calling {tool_name}]");
        }
        AgentEvent::ToolEnd { tool_name, .. } => {
            println!("[{tool_name} done]");
        }
        AgentEvent::ToolBlocked { tool_name, .. } => {
            println!("[{tool_name} blocked: rejected by user]");
        }
        AgentEvent::CompactStart { .. } => {
            println!("\n[compacting conversation history...]");
        }
        AgentEvent::CompactEnd { content } => {
            println!("[{content}]");
        }
        AgentEvent::Cancelled { content } => {
            println!("\n[cancelled: {content}]");
        }
        AgentEvent::Error { content } => {
            eprintln!("\n[error: {content}]");
        }
        AgentEvent::TurnComplete { .. } => {
            println!();
        }
    }
}

fn final_assistant_text(events: &[AgentEvent]) -> String {
    events
        .iter()
        .filter_map(|e| match e {
            AgentEvent::Text { content } => Some(content.as_str()),
            _ => None,
        })
        .collect()
}

fn prompt_yes_no(question: &str) -> bool {
    print!("{question} [y/N] ");
    let _ = io::stdout().flush();
    let mut input = String::new();
    if io::stdin().read_line(&mut input).is_err() {
        return false;
    }
    matches!(input.trim().to_lowercase().as_str(), "y" | "yes")
}

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    std::process::exit(run(args).await);
}

async fn run(args: CliArgs) -> i32 {
    env_logger::init();

    if args.list {
        return list_conversations();
    }

    let base_url = config::get_base_url(args.base_url.as_deref());
    let api_key = config::get_api_key();
    let profile_name = config::get_profile_name(args.profile.as_deref());

    let mut profile = match load_profile(&profile_name) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("error: {e}");
            return 1;
        }
    };

    if let Some(shell_mode) = &args.shell_mode {
        profile.shell = match shell_mode.as_str() {
            "restricted" => ro_agent_core::ShellMode::Restricted,
            "unrestricted" => ro_agent_core::ShellMode::Unrestricted,
            other => {
                eprintln!("error: unknown --shell-mode '{other}'");
                return 1;
            }
        };
    }
    if let Some(file_write_mode) = &args.file_write_mode {
        profile.file_write = match file_write_mode.as_str() {
            "off" => ro_agent_core::FileWriteMode::Off,
            "create-only" => ro_agent_core::FileWriteMode::CreateOnly,
            "full" => ro_agent_core::FileWriteMode::Full,
            other => {
                eprintln!("error: unknown --file-write-mode '{other}'");
                return 1;
            }
        };
    }

    let working_dir = args.working_dir.clone().unwrap_or_else(|| ".".to_string());
    let registry = create_registry_from_profile(&profile, &working_dir);

    let (system_prompt, mut resumed) = match build_system_prompt_and_history(&args) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("error: {e}");
            return 1;
        }
    };

    // A resumed conversation's model wins unless the caller explicitly
    // asked for a different one via --model.
    let model = match &args.model {
        Some(_) => config::get_model(args.model.as_deref()),
        None => resumed.model.take().unwrap_or_else(|| config::get_model(None)),
    };

    let client = match ModelClient::new(model.clone(), base_url, api_key, None) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return 1;
        }
    };

    let mut session = Session::new(system_prompt.clone());
    session.history.append(&mut resumed.history);
    session.update_token_usage(resumed.input_tokens, resumed.output_tokens);

    let auto_approve = Arc::new(AtomicBool::new(args.auto_approve));
    let approval_flag = auto_approve.clone();
    let approval_callback: ro_agent_core::ApprovalCallback = Arc::new(move |tool_name, tool_args| {
        let approval_flag = approval_flag.clone();
        Box::pin(async move {
            if approval_flag.load(Ordering::SeqCst) {
                return true;
            }
            prompt_yes_no(&format!("Approve call to '{tool_name}' with arguments {tool_args}?"))
        })
    });

    let mut agent = Agent::new(session, registry, client).with_approval_callback(approval_callback);

    let started = chrono::Utc::now();
    let session_id = started.format("%Y-%m-%d_%H-%M-%S").to_string();
    let signal_manager = SignalManager::from_env().ok();
    if let Some(manager) = &signal_manager {
        let info = AgentInfo {
            session_id: session_id.clone(),
            pid: std::process::id(),
            model: model.clone(),
            instruction_preview: args.prompt_positional.clone().unwrap_or_default(),
            started_at: chrono::Utc::now().to_rfc3339(),
        };
        let _ = manager.register(&info);
        let manager = Arc::new(manager_clone_dir(manager));
        let session_id_for_check = session_id.clone();
        agent = agent.with_cancel_check(Arc::new(move || manager.is_cancelled(&session_id_for_check)));
    }

    let observability_config = ObservabilityConfig::from_env();
    let mut processor = if observability_config.enabled {
        match TelemetryContext::from_config(&observability_config, &model, &profile_name) {
            Ok(ctx) => match ro_agent_core::create_exporter(&observability_config) {
                Ok(exporter) => {
                    let p = ObservabilityProcessor::new(ctx, Arc::from(exporter)).with_capture(
                        observability_config.capture.tool_arguments,
                        observability_config.capture.tool_results,
                    );
                    p.start_session().await;
                    Some(p)
                }
                Err(_) => None,
            },
            Err(_) => None,
        }
    } else {
        None
    };

    let exit_code = if let Some(prompt) = args.prompt_positional.clone() {
        run_one_shot(&mut agent, &prompt, args.output.as_deref(), processor.as_mut()).await
    } else {
        run_repl(&mut agent, processor.as_mut()).await
    };

    if let Some(processor) = processor.as_mut() {
        processor.end_session("completed").await;
    }
    if let Some(manager) = &signal_manager {
        manager.deregister(&session_id);
    }

    if let Ok(store) = ConversationStore::from_env() {
        let session = agent.session();
        let _ = store.save(
            &model,
            &system_prompt,
            &session.history,
            session.total_input_tokens,
            session.total_output_tokens,
            started,
            chrono::Utc::now(),
            Some(session_id.clone()),
        );
    }

    exit_code
}

/// `SignalManager` doesn't implement `Clone`; this reopens a fresh manager
/// rooted at the same directory so the cancel-check closure can own one
/// independently of the original used for register/deregister.
fn manager_clone_dir(manager: &SignalManager) -> SignalManager {
    SignalManager::new(manager.dir().to_path_buf()).expect("signal dir already exists")
}

async fn run_one_shot(
    agent: &mut Agent,
    prompt: &str,
    output_path: Option<&std::path::Path>,
    mut processor: Option<&mut ObservabilityProcessor>,
) -> i32 {
    if let Some(path) = output_path {
        if path.exists() {
            eprintln!("error: output file '{}' already exists", path.display());
            return 1;
        }
    }

    let events = agent.run_turn(prompt).await;
    for event in &events {
        print_event(event);
    }
    if let Some(processor) = processor.as_deref_mut() {
        processor.wrap_turn(prompt, events.clone()).await;
    }

    if let Some(path) = output_path {
        let text = final_assistant_text(&events);
        if let Err(e) = std::fs::write(path, text) {
            eprintln!("error writing output: {e}");
            return 1;
        }
    }

    0
}

async fn run_repl(agent: &mut Agent, mut processor: Option<&mut ObservabilityProcessor>) -> i32 {
    println!("ro-agent interactive session. Type /help for commands, exit to quit.");
    let stdin = io::stdin();

    loop {
        print!("> ");
        let _ = io::stdout().flush();
        let mut line = String::new();
        if stdin.read_line(&mut line).unwrap_or(0) == 0 {
            break;
        }
        let line = line.trim_end_matches('\n');
        if line.trim().is_empty() {
            continue;
        }

        match cli::handle_slash_command(line) {
            SlashCommandResult::Exit => break,
            SlashCommandResult::Help => {
                println!("{}", cli::help_text());
                continue;
            }
            SlashCommandResult::Approve => {
                println!("[auto-approve enabled for remainder of session]");
                continue;
            }
            SlashCommandResult::Clear => {
                agent.session_mut().clear();
                println!("[conversation cleared]");
                continue;
            }
            SlashCommandResult::Compact(guidance) => {
                match agent.compact(&guidance, ro_agent_core::CompactTrigger::Manual).await {
                    Ok(result) => println!("[compacted: {} -> {} tokens]", result.tokens_before, result.tokens_after),
                    Err(e) => eprintln!("[compact failed: {e}]"),
                }
                continue;
            }
            SlashCommandResult::NotACommand => {}
        }

        let events = agent.run_turn(line).await;
        for event in &events {
            print_event(event);
        }
        if let Some(processor) = processor.as_deref_mut() {
            processor.wrap_turn(line, events).await;
        }
    }

    0
}

/// What resuming a prior conversation contributes on top of a fresh one.
#[derive(Default)]
struct Resumed {
    history: Vec<ro_agent_core::Message>,
    model: Option<String>,
    input_tokens: u64,
    output_tokens: u64,
}

/// Builds the system prompt (`--system` or `--prompt` file, with variable
/// substitution) and any resumed state (`--resume`): history, cumulative
/// token totals, and the model the conversation was started with.
fn build_system_prompt_and_history(args: &CliArgs) -> ro_agent_core::Result<(String, Resumed)> {
    let mut system_prompt = args.system.clone().unwrap_or_else(|| "You are a helpful assistant.".to_string());

    if let Some(prompt_path) = &args.prompt {
        let contents = std::fs::read_to_string(prompt_path).map_err(ro_agent_core::Error::Io)?;
        let (body, defaults) = cli::parse_prompt_file(&contents)?;
        let vars_file = match &args.vars_file {
            Some(path) => {
                let contents = std::fs::read_to_string(path).map_err(ro_agent_core::Error::Io)?;
                Some(cli::load_vars_file(&contents)?)
            }
            None => None,
        };
        let merged = cli::merge_vars(defaults, vars_file, &args.var);
        system_prompt = cli::substitute_vars(&body, &merged);
    }

    let resumed = match &args.resume {
        Some(id) => {
            let store = ConversationStore::from_env()?;
            let resolved_id = if id == "latest" { store.get_latest_id()?.unwrap_or_else(|| id.clone()) } else { id.clone() };
            match store.load(&resolved_id)? {
                Some(conversation) => {
                    system_prompt = conversation.system_prompt;
                    Resumed {
                        history: conversation.history,
                        model: Some(conversation.model),
                        input_tokens: conversation.input_tokens,
                        output_tokens: conversation.output_tokens,
                    }
                }
                None => Resumed::default(),
            }
        }
        None => Resumed::default(),
    };

    Ok((system_prompt, resumed))
}

fn list_conversations() -> i32 {
    let store = match ConversationStore::from_env() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return 1;
        }
    };
    match store.list_conversations(50) {
        Ok(conversations) => {
            if conversations.is_empty() {
                println!("No saved conversations.");
            }
            for meta in conversations {
                println!("{}  {}  {}", meta.id, meta.model, meta.display_preview());
            }
            0
        }
        Err(e) => {
            eprintln!("error: {e}");
            1
        }
    }
}
