//! Command line
//!
//! - `serve`: HTTP service
//! - `generate`: one report from a draft file and screenshots
//! - `ocr`: stream text extracted from one image
//! - `summary`: executive summary over finished reports
//! - `stats`: vulnerability statistics over finished reports

use crate::api;
use crate::state::AppState;
use anyhow::{bail, Context};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use futures::stream::BoxStream;
use futures::StreamExt;
use porfiry_core::{
    executive_summary_request, merge_without_images, parse_statistics, Assembler, Assembly,
    AssemblyEvent, DraftSession, JsonFileStore, OcrService, OllamaChat, OllamaOcr, PorfiryConfig,
    PromptVariant, ReportStore,
};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

/// Command definition
#[must_use]
pub fn command() -> Command {
    Command::new("porfiry")
        .version(porfiry_core::VERSION)
        .about("Pentest report assembly from notes and screenshots")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .subcommand(
            Command::new("serve").about("Run the HTTP service").arg(
                Arg::new("listen")
                    .long("listen")
                    .value_parser(value_parser!(SocketAddr))
                    .help("Listen address, overrides server.listen"),
            ),
        )
        .subcommand(
            Command::new("generate")
                .about("Generate one report, streaming tokens to stdout")
                .arg(Arg::new("title").long("title").help("Finding title"))
                .arg(
                    Arg::new("draft")
                        .long("draft")
                        .value_parser(value_parser!(PathBuf))
                        .help("File holding the draft notes"),
                )
                .arg(
                    Arg::new("shot")
                        .long("shot")
                        .action(ArgAction::Append)
                        .help("Screenshot path, in order; becomes screenshotN"),
                )
                .arg(
                    Arg::new("variant")
                        .long("variant")
                        .default_value("report")
                        .value_parser(value_parser!(PromptVariant))
                        .help("report or killchain"),
                )
                .arg(
                    Arg::new("out")
                        .long("out")
                        .default_value("report.md")
                        .value_parser(value_parser!(PathBuf))
                        .help("Where to write the resolved Markdown"),
                )
                .arg(
                    Arg::new("save")
                        .long("save")
                        .value_name("PROJECT")
                        .help("Also save the result to the report store under PROJECT"),
                ),
        )
        .subcommand(
            Command::new("ocr").about("Extract text from one image").arg(
                Arg::new("path")
                    .required(true)
                    .help("Local image path or http(s) URL"),
            ),
        )
        .subcommand(
            Command::new("summary")
                .about("Stream an executive summary of finished reports")
                .arg(reports_arg()),
        )
        .subcommand(
            Command::new("stats")
                .about("Print vulnerability statistics of finished reports")
                .arg(reports_arg()),
        )
}

fn reports_arg() -> Arg {
    Arg::new("reports")
        .required(true)
        .num_args(1..)
        .value_parser(value_parser!(PathBuf))
        .help("Markdown report files")
}

/// Run the selected subcommand
///
/// # Errors
/// Configuration, I/O and assembly failures, with context.
pub async fn run(matches: &ArgMatches) -> anyhow::Result<()> {
    let config = PorfiryConfig::load(matches.get_one::<PathBuf>("config").map(PathBuf::as_path))?;

    match matches.subcommand() {
        Some(("serve", args)) => serve(&config, args).await,
        Some(("generate", args)) => generate(&config, args).await,
        Some(("ocr", args)) => {
            let path = args.get_one::<String>("path").context("missing image path")?;
            ocr(&config, path).await
        }
        Some(("summary", args)) => summary(&config, &read_reports(args).await?).await,
        Some(("stats", args)) => {
            let merged = merge_without_images(read_reports(args).await?);
            println!("{}", parse_statistics(&merged).render());
            Ok(())
        }
        Some((other, _)) => bail!("unknown command '{other}'"),
        None => bail!("no command given"),
    }
}

async fn serve(config: &PorfiryConfig, args: &ArgMatches) -> anyhow::Result<()> {
    let addr = match args.get_one::<SocketAddr>("listen") {
        Some(addr) => *addr,
        None => config.listen_addr()?,
    };
    let state = AppState::from_config(config)?;
    tracing::info!(
        model = %state.assembler.model_name(),
        ocr_model = %state.ocr.status().model,
        store = %config.store.path.display(),
        "starting service"
    );

    let (bound, server) = warp::serve(api::routes(state))
        .try_bind_with_graceful_shutdown(addr, async {
            tokio::signal::ctrl_c().await.ok();
        })
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%bound, "listening");
    server.await;
    tracing::info!("shut down");
    Ok(())
}

async fn generate(config: &PorfiryConfig, args: &ArgMatches) -> anyhow::Result<()> {
    let mut session = DraftSession::new();
    if let Some(title) = args.get_one::<String>("title") {
        session.set_title(title.clone());
    }
    if let Some(path) = args.get_one::<PathBuf>("draft") {
        let draft = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read draft {}", path.display()))?;
        session.set_draft(draft);
    }
    for shot in args.get_many::<String>("shot").into_iter().flatten() {
        session.add_screenshot(shot.clone(), file_name(shot));
    }

    let variant = args
        .get_one::<PromptVariant>("variant")
        .copied()
        .unwrap_or_default();
    let request = session.report_request(variant).await?;
    let assembler = Assembler::from_config(Arc::new(OllamaChat::from_config(&config.model)?), config)?;
    let assembly = print_events(assembler.generate_events(request).await?).await?;
    session.record(&assembly);

    if let Some(out) = args.get_one::<PathBuf>("out") {
        tokio::fs::write(out, &assembly.markdown)
            .await
            .with_context(|| format!("failed to write {}", out.display()))?;
        eprintln!("\nwrote {}", out.display());
    }

    if let Some(project) = args.get_one::<String>("save") {
        let report = session.to_new_report(project)?;
        let store = JsonFileStore::new(config.store.path.clone());
        let saved = tokio::task::spawn_blocking(move || store.save(report)).await??;
        eprintln!("saved {} in project {}", saved.id, saved.project);
    }
    Ok(())
}

async fn ocr(config: &PorfiryConfig, path: &str) -> anyhow::Result<()> {
    let service = OcrService::from_config(Arc::new(OllamaOcr::from_config(&config.ocr)?), &config.ocr);
    let mut chunks = service.ocr_stream(path).await?;
    let mut stdout = tokio::io::stdout();
    while let Some(chunk) = chunks.next().await {
        stdout.write_all(chunk.as_bytes()).await?;
        stdout.flush().await?;
    }
    stdout.write_all(b"\n").await?;
    Ok(())
}

async fn summary(config: &PorfiryConfig, reports: &[String]) -> anyhow::Result<()> {
    let assembler = Assembler::from_config(Arc::new(OllamaChat::from_config(&config.model)?), config)?;
    let events = assembler.generate_events(executive_summary_request(reports)).await?;
    print_events(events).await?;
    println!();
    Ok(())
}

async fn read_reports(args: &ArgMatches) -> anyhow::Result<Vec<String>> {
    let mut reports = Vec::new();
    for path in args.get_many::<PathBuf>("reports").into_iter().flatten() {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read report {}", path.display()))?;
        reports.push(text);
    }
    Ok(reports)
}

async fn print_events(mut events: BoxStream<'static, AssemblyEvent>) -> anyhow::Result<Assembly> {
    let mut stdout = tokio::io::stdout();
    while let Some(event) = events.next().await {
        match event {
            AssemblyEvent::Token(token) => {
                stdout.write_all(token.as_bytes()).await?;
                stdout.flush().await?;
            }
            AssemblyEvent::Completed(assembly) => return Ok(assembly),
            AssemblyEvent::Failed(message) => bail!("generation failed: {message}"),
        }
    }
    bail!("generation ended without a result")
}

fn file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map_or_else(|| path.to_string(), |name| name.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn command_definition_is_consistent() {
        command().debug_assert();
    }

    #[test]
    fn generate_collects_shots_in_order() {
        let matches = command()
            .try_get_matches_from([
                "porfiry", "generate", "--title", "IDOR", "--shot", "/tmp/b.png", "--shot", "/tmp/a.png",
                "--variant", "killchain",
            ])
            .unwrap();
        let (name, args) = matches.subcommand().unwrap();
        assert_eq!(name, "generate");
        let shots: Vec<&String> = args.get_many::<String>("shot").unwrap().collect();
        assert_eq!(shots, ["/tmp/b.png", "/tmp/a.png"]);
        assert_eq!(args.get_one::<PromptVariant>("variant"), Some(&PromptVariant::KillChain));
        assert_eq!(args.get_one::<PathBuf>("out"), Some(&PathBuf::from("report.md")));
    }

    #[test]
    fn config_flag_is_global() {
        let matches = command()
            .try_get_matches_from(["porfiry", "stats", "a.md", "b.md", "--config", "porfiry.toml"])
            .unwrap();
        assert_eq!(matches.get_one::<PathBuf>("config"), Some(&PathBuf::from("porfiry.toml")));
    }

    #[test]
    fn unknown_variant_is_rejected() {
        assert!(command()
            .try_get_matches_from(["porfiry", "generate", "--variant", "poem"])
            .is_err());
    }

    #[test]
    fn screenshot_original_name_is_the_file_name() {
        assert_eq!(file_name("/tmp/uploads/login.png"), "login.png");
        assert_eq!(file_name("login.png"), "login.png");
    }
}
