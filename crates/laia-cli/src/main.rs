//! LAIA command-line interface for the security configurator and guided setup.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use laia_core::{
    config::{default_settings_path, ConfigStore, SettingField, SettingsDocument},
    credentials::{default_credentials_path, is_secret, read_credentials, API_BASE_KEY},
    guard::{GuardedMutator, Proposal},
    host::HostFacts,
    logging,
    probe::{ServiceProbe, ServiceState, DEFAULT_PROBE_TIMEOUT},
    risk::{classify, RiskEntry, RiskTier},
    wizard::{CompiledSetup, ModelCatalog, SetupMode, WizardEngine, PROVIDERS},
    workflow::{
        apply_setup, spawn_plan, ActionExecutor, ProvisioningRunner, ProvisioningStep,
        StepStatus, WorkflowLevel, WorkflowReport, APPLY_FIREWALL, SECURITY_AUDIT,
    },
    LaiaError,
};
use log::warn;
use rpassword::prompt_password;
use schemars::schema_for;
use serde_json::to_string_pretty;
use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

/// Top-level command-line options shared by every subcommand.
#[derive(Parser, Debug)]
#[command(
    name = "laia",
    version,
    about = "Security configurator and guided setup for the OpenClaw assistant."
)]
struct Cli {
    /// Settings document (default: $LAIA_OPENCLAW_CONFIG or ~/.openclaw/openclaw.json).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Credential file (default: $LAIA_CREDENTIALS_PATH or ~/.laia/api_keys.env).
    #[arg(long, global = true)]
    credentials: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the security settings with the risk of each current value.
    Show,

    /// Change one setting; dangerous values need confirmation.
    Set {
        /// Field path, e.g. security.exec.ask or features.camera.
        field: String,

        /// New value, e.g. on-miss, true, 127.0.0.1.
        value: String,

        /// Confirm dangerous changes without prompting.
        #[arg(long, conflicts_with = "no")]
        yes: bool,

        /// Decline dangerous changes without prompting.
        #[arg(long)]
        no: bool,
    },

    /// Show the security dashboard.
    Status {
        /// Per-check timeout in seconds.
        #[arg(long, default_value_t = DEFAULT_PROBE_TIMEOUT.as_secs())]
        timeout_secs: u64,
    },

    /// Probe named checks or systemd units.
    Check {
        #[arg(required = true)]
        names: Vec<String>,

        #[arg(long, default_value_t = DEFAULT_PROBE_TIMEOUT.as_secs())]
        timeout_secs: u64,
    },

    /// Run the guided setup non-interactively and provision the host.
    Setup {
        #[arg(long, value_enum)]
        mode: ModeArg,

        /// Online provider id.
        #[arg(long)]
        provider: Option<String>,

        /// Read the API key from this environment variable.
        #[arg(long, conflicts_with = "prompt_api_key")]
        api_key_env: Option<String>,

        /// Prompt for the API key on the terminal.
        #[arg(long)]
        prompt_api_key: bool,

        /// Models to download in local mode (comma separated).
        #[arg(long, value_delimiter = ',')]
        models: Option<Vec<String>>,

        /// Skip model downloads in local mode.
        #[arg(long)]
        skip_models: bool,

        /// LAN server address.
        #[arg(long)]
        host: Option<String>,

        /// LAN server port.
        #[arg(long)]
        port: Option<String>,

        /// Alternate model catalog (TOML).
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Print the summary and plan without writing or running anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the configured AI mode and provider.
    Ai,

    /// Run a quick lynis security audit.
    Audit,

    /// Apply the LAIA firewall rules.
    Firewall,

    /// Print the JSON schema of the settings document.
    Schema,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ModeArg {
    Online,
    Local,
    Lan,
}

impl From<ModeArg> for SetupMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Online => SetupMode::Online,
            ModeArg::Local => SetupMode::Local,
            ModeArg::Lan => SetupMode::Lan,
        }
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

/// Dispatch to the requested subcommand.
fn run() -> Result<()> {
    logging::init("info");
    let cli = Cli::parse();

    match cli.command {
        Commands::Show => {
            let store = settings_store(cli.config)?;
            let loaded = store
                .load()
                .with_context(|| format!("failed to load {}", store.path().display()))?;
            if loaded.used_defaults() {
                println!(
                    "{} not found; showing defaults (nothing written).",
                    store.path().display()
                );
            }
            print_settings(&loaded.document);
        }

        Commands::Set {
            field,
            value,
            yes,
            no,
        } => {
            let store = settings_store(cli.config)?;
            let field: SettingField = field.parse()?;
            let value = field.parse_value(&value)?;
            let loaded = store
                .load()
                .with_context(|| format!("refusing to edit {}", store.path().display()))?;
            let mutator = GuardedMutator::new(loaded.document);

            let outcome = mutator.propose(field, value.clone(), |entry| {
                if yes {
                    true
                } else if no {
                    false
                } else {
                    confirm_on_terminal(field, entry).unwrap_or_else(|err| {
                        warn!("confirmation prompt failed: {err}");
                        false
                    })
                }
            })?;

            match outcome {
                Proposal::Rejected(_) => {
                    println!("Declined; {field} left unchanged.");
                }
                Proposal::Applied(entry) => {
                    mutator
                        .save(&store)
                        .with_context(|| format!("failed to save {}", store.path().display()))?;
                    println!("{field} = {value} [{}]", entry.tier);
                    if entry.tier == RiskTier::Caution {
                        println!("  note: {}", entry.rationale);
                    }
                    println!("Saved {} (previous version in .bak).", store.path().display());
                }
            }
        }

        Commands::Status { timeout_secs } => {
            let runtime = runtime()?;
            let probe = ServiceProbe::system();
            let report =
                runtime.block_on(probe.dashboard(Duration::from_secs(timeout_secs.max(1))));
            println!("Security dashboard");
            print!("{}", report.render());
        }

        Commands::Check {
            names,
            timeout_secs,
        } => {
            let runtime = runtime()?;
            let probe = ServiceProbe::system();
            let results =
                runtime.block_on(probe.check_all(&names, Duration::from_secs(timeout_secs.max(1))));
            let mut all_active = true;
            for result in results {
                all_active &= result.state == ServiceState::Active;
                println!("{:<20} {:<9} {}", result.name, result.state, result.detail);
            }
            if !all_active {
                std::process::exit(3);
            }
        }

        Commands::Setup {
            mode,
            provider,
            api_key_env,
            prompt_api_key,
            models,
            skip_models,
            host,
            port,
            catalog,
            dry_run,
        } => {
            let catalog = match catalog {
                Some(path) => ModelCatalog::load(&path)
                    .with_context(|| format!("failed to load catalog {}", path.display()))?,
                None => ModelCatalog::builtin()?,
            };
            let mut engine = WizardEngine::new(HostFacts::detect(), catalog);
            engine.advance()?;
            engine.choose_mode(mode.into())?;
            engine.advance()?;

            match SetupMode::from(mode) {
                SetupMode::Online => {
                    if let Some(id) = provider {
                        engine.set_provider(&id)?;
                    }
                    let key = read_api_key(api_key_env, prompt_api_key)?;
                    engine.set_api_key(key)?;
                }
                SetupMode::Local => {
                    println!("{}", engine.hardware_summary());
                    if let Some(models) = models {
                        engine.set_models(models)?;
                    }
                    engine.set_skip_models(skip_models)?;
                }
                SetupMode::Lan => {
                    engine.set_lan_host(host.as_deref().unwrap_or_default())?;
                    if let Some(port) = port {
                        if !engine.set_lan_port(&port)? {
                            println!(
                                "Port `{port}` is not valid; keeping {}.",
                                engine.draft().lan_port
                            );
                        }
                    }
                }
            }

            engine.advance().map_err(explain_incomplete)?;
            println!("{}", engine.summary());
            let compiled = engine.finish()?;

            if dry_run {
                print_plan(&compiled);
                return Ok(());
            }

            let credentials = credentials_path(cli.credentials)?;
            let report = apply_setup(&compiled, &credentials)
                .with_context(|| format!("failed to write {}", credentials.display()))?;
            print_report(report);

            if !compiled.plan.is_empty() {
                let runtime = runtime()?;
                let runner = Arc::new(ProvisioningRunner::system());
                let halted = runtime.block_on(run_plan(runner, compiled.plan, "Provisioning"))?;
                if halted {
                    bail!("provisioning stopped at a required step; see the report above");
                }
            }
        }

        Commands::Ai => {
            let path = credentials_path(cli.credentials)?;
            let credentials = match read_credentials(&path) {
                Ok(file) => file,
                Err(LaiaError::Io(err)) if err.kind() == io::ErrorKind::NotFound => {
                    println!("No AI configuration at {}. Run `laia setup`.", path.display());
                    return Ok(());
                }
                Err(err) => {
                    return Err(err).with_context(|| format!("failed to read {}", path.display()))
                }
            };
            println!("Mode:     {}", credentials.mode().unwrap_or("unknown"));
            if let Some(id) = credentials.provider() {
                let label = PROVIDERS
                    .iter()
                    .find(|p| p.id == id)
                    .map(|p| p.label)
                    .unwrap_or(id);
                println!("Provider: {label}");
            }
            if let Some(base) = credentials.get(API_BASE_KEY) {
                println!("API base: {base}");
            }
            if credentials.keys().any(is_secret) {
                println!("API key:  set (hidden)");
            }
            if let (Some(host), Some(port)) = (
                credentials.get("LAIA_LAN_HOST"),
                credentials.get("LAIA_LAN_PORT"),
            ) {
                println!("Server:   {host}:{port}");
            }
        }

        Commands::Audit => run_single_action(SECURITY_AUDIT, "Security audit (lynis)")?,

        Commands::Firewall => run_single_action(APPLY_FIREWALL, "Apply firewall rules")?,

        Commands::Schema => {
            let schema = schema_for!(SettingsDocument);
            println!("{}", to_string_pretty(&schema)?);
        }
    }

    Ok(())
}

fn settings_store(path: Option<PathBuf>) -> Result<ConfigStore> {
    let path = match path {
        Some(path) => path,
        None => default_settings_path()?,
    };
    Ok(ConfigStore::new(path))
}

fn credentials_path(path: Option<PathBuf>) -> Result<PathBuf> {
    match path {
        Some(path) => Ok(path),
        None => Ok(default_credentials_path()?),
    }
}

fn runtime() -> Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}

fn print_settings(doc: &SettingsDocument) {
    for field in SettingField::ALL {
        let value = doc.get(field);
        let entry = classify(field, &value);
        println!(
            "{:<24} {:<12} [{}] {}",
            field.path(),
            value.to_string(),
            entry.tier,
            entry.headline
        );
    }
    let extra = doc.extra.len() + doc.security.extra.len() + doc.features.extra.len();
    if extra > 0 {
        println!("({extra} other key(s) preserved)");
    }
}

fn confirm_on_terminal(field: SettingField, entry: &RiskEntry) -> io::Result<bool> {
    let mut stdout = io::stdout();
    writeln!(stdout, "\n{} ({field})", entry.headline)?;
    writeln!(stdout, "{}\n", entry.rationale)?;
    write!(stdout, "Type 'yes' to apply this change: ")?;
    stdout.flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("yes"))
}

fn read_api_key(env_var: Option<String>, prompt: bool) -> Result<String> {
    if let Some(var) = env_var {
        return env::var(&var).with_context(|| format!("environment variable {var} is not set"));
    }
    if prompt {
        return Ok(prompt_password("API key: ")?);
    }
    bail!("online mode needs --api-key-env <VAR> or --prompt-api-key")
}

fn explain_incomplete(err: LaiaError) -> anyhow::Error {
    match err {
        LaiaError::IncompleteStep { step, reason } => {
            anyhow::anyhow!("setup cannot continue past {step}: {reason}")
        }
        other => other.into(),
    }
}

fn print_plan(compiled: &CompiledSetup) {
    if compiled.plan.is_empty() {
        println!("No provisioning steps.");
        return;
    }
    println!("Provisioning plan:");
    for (i, step) in compiled.plan.iter().enumerate() {
        let policy = if step.fatal { "required" } else { "optional" };
        println!(
            "  {}. {} [{} {}] ({policy})",
            i + 1,
            step.description,
            step.action,
            step.args.join(" ")
        );
    }
}

/// Run `plan` in the background, printing each step as it finishes.
///
/// Returns whether a required step stopped the plan.
async fn run_plan<E>(
    runner: Arc<ProvisioningRunner<E>>,
    plan: Vec<ProvisioningStep>,
    title: &str,
) -> Result<bool>
where
    E: ActionExecutor + 'static,
{
    let (mut updates, handle) = spawn_plan(runner, plan, title.to_string());
    while let Some(update) = updates.recv().await {
        let status = match &update.outcome.status {
            StepStatus::Succeeded => "done".to_string(),
            StepStatus::Failed { exit_code } => format!("failed (exit {exit_code})"),
            StepStatus::TimedOut => "timed out".to_string(),
            StepStatus::Unavailable(why) => format!("unavailable: {why}"),
        };
        println!(
            "[{:>3.0}%] {} ... {status}",
            update.fraction * 100.0,
            update.step.description
        );
        if !update.outcome.succeeded() {
            let lines: Vec<&str> = update.outcome.output.lines().collect();
            for line in &lines[lines.len().saturating_sub(10)..] {
                println!("        {line}");
            }
        }
    }
    let summary = handle.await.context("provisioning task failed")?;
    print_report(summary.report);
    Ok(summary.halted_at.is_some())
}

fn run_single_action(action: &str, title: &str) -> Result<()> {
    let runner = ProvisioningRunner::system();
    let step = ProvisioningStep::new(title, action, Vec::new(), true);
    let mut run = runner.run(vec![step]);
    println!("Running {title}...");
    let failed = match run.next() {
        Some((_, outcome)) => {
            if !outcome.output.is_empty() {
                println!("{}", outcome.output);
            }
            !outcome.succeeded()
        }
        None => false,
    };
    print_report(run.into_report(title));
    if failed {
        bail!("{title} did not complete");
    }
    Ok(())
}

fn print_report(report: WorkflowReport) {
    println!("{}", report.title);
    for event in report.events {
        println!("  [{}] {}", level_tag(event.level), event.message);
    }
}

/// Short tag used when printing workflow severity levels.
fn level_tag(level: WorkflowLevel) -> &'static str {
    match level {
        WorkflowLevel::Info => "INFO",
        WorkflowLevel::Success => "OK",
        WorkflowLevel::Warn => "WARN",
        WorkflowLevel::Error => "ERR",
        WorkflowLevel::Security => "SEC",
    }
}
