use anyhow::{Context, bail};
use clap::{Parser as ClapParser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use wisp::{App, Config, Error, Registry, Scheduling, Value, binder, dom, interpolate};

#[derive(ClapParser)]
#[command(name = "wisp")]
#[command(about = "Reactive templating CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mount a template, replay events and print the resulting markup
    Render {
        /// Path to the template file
        file: PathBuf,
        /// TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Root variable as `name=json`, repeatable
        #[arg(long = "set", value_name = "NAME=JSON")]
        variables: Vec<String>,
        /// Event to dispatch as `id:event`, repeatable, applied in order
        #[arg(long = "dispatch", value_name = "ID:EVENT")]
        events: Vec<String>,
        /// Queue reactive runs until each dispatch finishes
        #[arg(long)]
        deferred: bool,
    },
    /// Check that the markup and every expression in it parse
    Check {
        /// Path to the template file
        file: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let clean = match cli.command {
        Commands::Render {
            file,
            config,
            variables,
            events,
            deferred,
        } => render(&file, config.as_deref(), &variables, &events, deferred)?,
        Commands::Check { file } => check(&file)?,
    };
    if !clean {
        std::process::exit(1);
    }
    Ok(())
}

fn render(
    file: &Path,
    config: Option<&Path>,
    variables: &[String],
    events: &[String],
    deferred: bool,
) -> anyhow::Result<bool> {
    let mut config = match config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if deferred {
        config.scheduling = Scheduling::Deferred;
    }
    for assignment in variables {
        let (name, json) = assignment
            .split_once('=')
            .with_context(|| format!("expected NAME=JSON, got `{assignment}`"))?;
        let value: serde_json::Value = serde_json::from_str(json)
            .with_context(|| format!("invalid JSON for `{name}`"))?;
        config.variables.insert(name.trim().to_owned(), Value::from(value));
    }

    let (filename, source) = read(file)?;
    let document = match dom::markup::parse_with(&source, &config.raw_text_elements) {
        Ok(document) => document,
        Err(error) => {
            eprintln!("{}", error.report(&filename, &source).trim_end());
            return Ok(false);
        }
    };
    let app = match App::mount(document, Registry::with_builtins(), config) {
        Ok(app) => app,
        Err(error) => {
            eprintln!("{}", error.report(&filename, &source).trim_end());
            return Ok(false);
        }
    };

    for event in events {
        let Some((id, name)) = event.split_once(':') else {
            bail!("expected ID:EVENT, got `{event}`");
        };
        match app.dispatch_to(id, name, Value::Undefined) {
            Some(handled) => log::info!("{name} on #{id} ran {handled} listener(s)"),
            None => bail!("no element with id `{id}`"),
        }
    }
    app.flush();
    println!("{}", app.to_html());

    let problems: Vec<Error> = app.diagnostics().into_iter().chain(app.failures()).collect();
    for problem in &problems {
        eprintln!("{}", problem.report(&filename, &source).trim_end());
    }
    Ok(problems.is_empty())
}

fn check(file: &Path) -> anyhow::Result<bool> {
    let (filename, source) = read(file)?;
    let document = match dom::parse(&source) {
        Ok(document) => document,
        Err(error) => {
            eprintln!("{}", error.report(&filename, &source).trim_end());
            return Ok(false);
        }
    };

    let mut errors = Vec::new();
    for node in document.descendants() {
        if node.is_text() {
            if let Err(error) = interpolate::parse(&node.text_content()) {
                errors.push(error);
            }
            continue;
        }
        for (name, value) in node.attributes() {
            if name.starts_with(':') || name.starts_with('@') {
                if let Err(error) = binder::bind(&value) {
                    errors.push(error);
                }
            }
        }
        if node.tag_name() == Some("effect") && !node.text_content().trim().is_empty() {
            if let Err(error) = binder::bind(&node.text_content()) {
                errors.push(error);
            }
        }
    }

    for error in &errors {
        eprintln!("{}", error.report(&filename, &source).trim_end());
    }
    if errors.is_empty() {
        eprintln!("{filename}: ok");
    } else {
        eprintln!("{filename}: {} error(s)", errors.len());
    }
    Ok(errors.is_empty())
}

fn read(file: &Path) -> anyhow::Result<(String, String)> {
    let source =
        fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    Ok((file.display().to_string(), source))
}
