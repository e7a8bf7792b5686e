//! labflow - command-line front-end for the lab's notebook workflow.
//!
//! Subcommands:
//!
//! - `login`: run the browser login and list the available notebooks
//! - `scaffold`: lay down the standard experiment skeleton locally
//! - `mirror`: mirror an experiment's folder taxonomy onto local disk
//! - `behavior`: collect behavior forms from a notebook and export them

use clap::{Parser, Subcommand};
use std::env;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use labflow::config::DEFAULT_LOGIN_TIMEOUT;
use labflow::models::ROOT_TREE_ID;
use labflow::{
    apply_plan, authenticate, create_template, decode_entries, export_form, missing_locally,
    plan_experiment, BehaviorForm, Config, ConfigError, ExportError, FormError, LabClient,
    MakeMethod, SessionContext,
};

#[derive(Parser)]
#[command(name = "labflow", version, about = "Lab notebook data workflow")]
struct Cli {
    /// Notebook service base URL
    #[arg(long, env = "API_URL", global = true)]
    api_url: Option<String>,

    /// Access key id issued by the notebook service
    #[arg(long, env = "ACCESS_KEY_ID", global = true)]
    access_key_id: Option<String>,

    /// Access password paired with the key id
    #[arg(long, env = "ACCESS_PASSWORD", hide_env_values = true, global = true)]
    access_password: Option<String>,

    /// PEM certificate to trust, used only if the file exists
    #[arg(long, env = "SSL_CER", global = true)]
    ssl_cer: Option<PathBuf>,

    /// Loopback port receiving the login redirect [default: 8000]
    #[arg(long, env = "CALLBACK_PORT", global = true)]
    callback_port: Option<u16>,

    /// Seconds to wait for the browser login
    #[arg(long, default_value_t = DEFAULT_LOGIN_TIMEOUT.as_secs(), global = true)]
    login_timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and list notebooks
    Login,

    /// Create the standard experiment skeleton under ROOT
    Scaffold { root: PathBuf },

    /// Mirror an experiment's folders onto local disk
    Mirror {
        #[arg(long)]
        notebook: String,
        #[arg(long)]
        experiment: String,
        /// existing: only folders present in the notebook; all: every data kind
        #[arg(long, default_value = "existing")]
        method: MakeMethod,
        /// Local directory the experiment folder is created in
        #[arg(long)]
        root: PathBuf,
        /// Only report what is missing locally
        #[arg(long)]
        check: bool,
    },

    /// Collect behavior forms from every page of a notebook
    Behavior {
        #[arg(long)]
        notebook: String,
        /// Export decoded forms into this existing directory
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

impl Cli {
    fn config(&self) -> Result<Config, ConfigError> {
        let mut config = Config::from_lookup(|name| match name {
            "API_URL" => self.api_url.clone(),
            "ACCESS_KEY_ID" => self.access_key_id.clone(),
            "ACCESS_PASSWORD" => self.access_password.clone(),
            "SSL_CER" => self.ssl_cer.as_ref().map(|p| p.display().to_string()),
            "CALLBACK_PORT" => self.callback_port.map(|p| p.to_string()),
            // Lowercase spellings only come from the environment
            other => env::var(other).ok(),
        })?;
        config.login_timeout = Duration::from_secs(self.login_timeout);
        Ok(config)
    }
}

async fn login(cli: &Cli) -> Result<(LabClient, SessionContext), Box<dyn Error>> {
    let client = LabClient::new(cli.config()?)?;
    let session = authenticate(&client).await?;
    Ok((client, SessionContext::new(session)))
}

async fn mirror(
    client: &LabClient,
    ctx: &mut SessionContext,
    experiment: &str,
    method: MakeMethod,
    root: &Path,
    check: bool,
) -> Result<(), Box<dyn Error>> {
    let nbid = ctx.nbid()?.to_string();
    let experiments = client.dir_nodes(&ctx.session, &nbid).await?;
    let node = ctx.select_experiment(&experiments, experiment)?.clone();

    let tree = client.experiment_tree(&ctx.session, &nbid, &node).await?;
    let plan = plan_experiment(root, &tree, method);

    if check {
        let missing = missing_locally(&plan);
        if missing.is_empty() {
            println!("{} is in sync", node.display_text);
        }
        for dir in missing {
            println!("missing: {}", dir.display());
        }
        return Ok(());
    }

    if !root.is_dir() {
        return Err(format!("{} does not exist", root.display()).into());
    }
    let created = apply_plan(&plan)?;
    println!("Experiment directories created ({} new)", created);
    Ok(())
}

async fn collect_behavior_forms(
    client: &LabClient,
    ctx: &SessionContext,
) -> Result<Vec<BehaviorForm>, Box<dyn Error>> {
    let nbid = ctx.nbid()?;
    let pages = client.page_nodes(&ctx.session, nbid, ROOT_TREE_ID).await?;
    info!("Scanning {} pages", pages.len());

    let mut forms = Vec::new();
    for page in pages {
        let xml = match client.entries_for_page(&ctx.session, nbid, &page.tree_id).await {
            Ok(xml) => xml,
            Err(e) => {
                warn!("Could not fetch entries of {}: {}", page.display_text, e);
                continue;
            }
        };
        match decode_entries(&xml) {
            Ok(results) => {
                for result in results {
                    match result {
                        Ok(form) => forms.push(form),
                        Err(e @ FormError::SchemaMismatch { .. }) => {
                            warn!("Skipping entry on {}: {}", page.display_text, e)
                        }
                        Err(e) => debug!("Skipping entry on {}: {}", page.display_text, e),
                    }
                }
            }
            Err(FormError::EmptyResult) => debug!("{} has no entries", page.display_text),
            Err(e) => warn!("Skipping page {}: {}", page.display_text, e),
        }
    }
    Ok(forms)
}

async fn behavior(
    client: &LabClient,
    ctx: &SessionContext,
    out: Option<&Path>,
) -> Result<(), Box<dyn Error>> {
    let forms = collect_behavior_forms(client, ctx).await?;
    println!("Found {} behavior forms", forms.len());
    for form in &forms {
        println!(
            "  {}  {}  ({})",
            form.metadata.get("Date").unwrap_or("-"),
            form.metadata.get("Experiment").unwrap_or("-"),
            form.metadata.get("Personnel Running Task").unwrap_or("-"),
        );
    }

    let Some(out) = out else { return Ok(()) };
    if !out.is_dir() {
        return Err(format!(
            "{} does not exist. Please choose an existing directory!",
            out.display()
        )
        .into());
    }
    for form in &forms {
        match export_form(out, form) {
            Ok(dir) => println!("wrote {}", dir.display()),
            Err(e @ (ExportError::Exists(_) | ExportError::MissingDate)) => warn!("{}", e),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Loaded first so RUST_LOG and the clap env fallbacks see the file
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match dotenv {
        Ok(path) => debug!("Loaded {}", path.display()),
        Err(e) => debug!("No .env loaded: {}", e),
    }
    let cli = Cli::parse();

    match &cli.command {
        Commands::Login => {
            let (_, ctx) = login(&cli).await?;
            println!(
                "Logged in as {} (uid {})",
                ctx.session.email.as_deref().unwrap_or("?"),
                ctx.session.user_id.as_deref().unwrap_or("?")
            );
            if ctx.notebooks().is_empty() {
                println!("No notebooks found! At least one notebook is required.");
            }
            for nb in ctx.notebooks() {
                println!("  {}  [{}]", nb.name, nb.id);
            }
        }
        Commands::Scaffold { root } => {
            let created = create_template(root)?;
            println!("Template ready at {} ({} directories)", root.display(), created.len());
        }
        Commands::Mirror {
            notebook,
            experiment,
            method,
            root,
            check,
        } => {
            let (client, mut ctx) = login(&cli).await?;
            ctx.select_notebook(notebook)?;
            mirror(&client, &mut ctx, experiment, *method, root, *check).await?;
        }
        Commands::Behavior { notebook, out } => {
            let (client, mut ctx) = login(&cli).await?;
            ctx.select_notebook(notebook)?;
            behavior(&client, &ctx, out.as_deref()).await?;
        }
    }

    Ok(())
}
