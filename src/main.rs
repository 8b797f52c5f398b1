//! payload 로더 CLI
//!
//! ## 사용법
//! ```
//! payload-loader check                       # 버전 판정
//! payload-loader update                      # payload 업데이트 1회 실행
//! payload-loader update --json               # 결과를 JSON으로 출력
//! payload-loader --target /opt/app/payload update
//! payload-loader --config ./loader.toml config
//! payload-loader help
//! ```
//!
//! ## 종료 코드
//! - `check`: `0` 업데이트 있음, `2` 최신 상태, `3` 지원 종료 버전, `1` 에러
//! - `update`: `0` 성공, `1` 실패(설치본 보존), `2` 설치 경로 미설정, `3` 복구 불가

use std::path::PathBuf;

use payload_loader::config::{config_file_path, LoaderConfig};
use payload_loader::startup::{self, StartupCheck};
use payload_loader::updater::{InjectorUpdater, UpdateOutcome, UpdaterError};
use payload_loader::LoaderError;

#[derive(Debug, Default, PartialEq, Eq)]
struct CliArgs {
    config: Option<PathBuf>,
    target: Option<String>,
    json: bool,
    command: Vec<String>,
}

fn parse_args(args: Vec<String>) -> anyhow::Result<CliArgs> {
    let mut parsed = CliArgs::default();
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let value = iter.next().ok_or_else(|| anyhow::anyhow!("--config requires a path"))?;
                parsed.config = Some(PathBuf::from(value));
            }
            "--target" => {
                let value = iter.next().ok_or_else(|| anyhow::anyhow!("--target requires a directory"))?;
                parsed.target = Some(value);
            }
            "--json" => parsed.json = true,
            _ => parsed.command.push(arg),
        }
    }
    Ok(parsed)
}

#[tokio::main]
async fn main() {
    // stdout은 JSON 출력용이므로 로그는 stderr로
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = match parse_args(std::env::args().skip(1).collect()) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("✗ {}", e);
            eprintln!("  Run 'payload-loader help' for usage.");
            std::process::exit(1);
        }
    };

    let command = args.command.first().map(String::as_str).unwrap_or("help");
    let code = match command {
        "help" | "--help" | "-h" => {
            print_help();
            0
        }
        "--version" | "-V" => {
            println!("payload-loader {}", env!("CARGO_PKG_VERSION"));
            0
        }
        "check" | "update" | "config" => match load_config(&args) {
            Ok(cfg) => match command {
                "check" => cmd_check(&cfg, args.json),
                "update" => cmd_update(cfg, args.json).await,
                _ => cmd_config(&cfg, args.json),
            },
            Err(e) => report_error(&e, args.json),
        },
        other => {
            eprintln!("✗ Unknown command: {}", other);
            eprintln!("  Run 'payload-loader help' for usage.");
            1
        }
    };
    std::process::exit(code);
}

fn load_config(args: &CliArgs) -> Result<LoaderConfig, LoaderError> {
    let mut cfg = LoaderConfig::load(args.config.as_deref())?;
    if let Some(ref target) = args.target {
        cfg.updater.install_target = Some(target.clone());
    }
    Ok(cfg)
}

fn report_error(e: &LoaderError, json: bool) -> i32 {
    if json {
        println!("{}", e.to_json());
    } else {
        eprintln!("✗ Error: {}", e);
    }
    1
}

// ═══════════════════════════════════════════════════════
// 명령어 핸들러
// ═══════════════════════════════════════════════════════

fn cmd_check(cfg: &LoaderConfig, json: bool) -> i32 {
    let check = match startup::evaluate(cfg) {
        Ok(check) => check,
        Err(e) => return report_error(&e, json),
    };

    if json {
        println!("{}", serde_json::to_string(&check).unwrap_or_else(|_| "{}".to_string()));
    } else {
        match &check {
            StartupCheck::Unsupported { current, minimum } => {
                println!("⚠ Version {} is no longer supported (minimum {}).", current, minimum);
                println!("  Update before starting the loader.");
            }
            StartupCheck::UpdateAvailable { current, latest } => {
                println!("📦 Update available: {} → {}", current, latest);
                println!();
                println!("💡 Run 'payload-loader update' to install it.");
            }
            StartupCheck::UpToDate { current } => {
                println!("✓ Version {} is up to date.", current);
            }
        }
    }

    match check {
        StartupCheck::UpdateAvailable { .. } => 0,
        StartupCheck::UpToDate { .. } => 2,
        StartupCheck::Unsupported { .. } => 3,
    }
}

async fn cmd_update(cfg: LoaderConfig, json: bool) -> i32 {
    if !cfg.updater.enabled {
        let message = "updater is disabled ([updater] enabled = false)";
        if json {
            println!("{}", serde_json::json!({ "success": false, "error": message, "error_code": "disabled" }));
        } else {
            eprintln!("⚠ {}", message);
        }
        return 1;
    }

    let updater = InjectorUpdater::new(cfg.updater);
    let result = updater.run().await;
    let outcome = UpdateOutcome::of(&result);

    if json {
        let body = match &result {
            Ok(report) => serde_json::json!({
                "success": true,
                "outcome": outcome,
                "report": report,
            }),
            Err(e) => serde_json::json!({
                "success": false,
                "outcome": outcome,
                "error": e,
                "error_code": e.error_code(),
                "message": e.user_message(),
            }),
        };
        println!("{}", body);
    } else {
        match &result {
            Ok(report) => {
                println!("✓ Payload updated at {}", report.install_target.display());
                println!("  {} bytes downloaded, {} files installed", report.bytes_fetched, report.files_extracted);
                for w in &report.warnings {
                    println!("  ⚠ Could not remove {}: {}", w.path, w.message);
                }
            }
            Err(e) if e.requires_manual_intervention() => {
                eprintln!("══════════════════════════════════════════════════");
                eprintln!("✗ UPDATE FAILED AND ROLLBACK FAILED");
                eprintln!("  {}", e);
                eprintln!("  {}", e.user_message());
                eprintln!("══════════════════════════════════════════════════");
            }
            Err(e) => {
                eprintln!("✗ Update failed: {}", e);
                eprintln!("  {}", e.user_message());
            }
        }
    }

    exit_code(&result)
}

fn exit_code<T>(result: &Result<T, UpdaterError>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(UpdaterError::NotConfigured { .. }) => 2,
        Err(e) => match e.outcome() {
            UpdateOutcome::FailedUnrecoverable => 3,
            _ => 1,
        },
    }
}

fn cmd_config(cfg: &LoaderConfig, json: bool) -> i32 {
    if json {
        println!("{}", serde_json::to_string(cfg).unwrap_or_else(|_| "{}".to_string()));
        return 0;
    }

    let u = &cfg.updater;
    println!("📋 Loader Configuration");
    println!("─────────────────────────────────────────────");
    println!("  version:               {}", cfg.version);
    println!("  min_supported_version: {}", cfg.min_supported_version.as_deref().unwrap_or("-"));
    println!("  latest_version:        {}", cfg.latest_version.as_deref().unwrap_or("-"));
    println!();
    println!("  [updater]");
    println!("  enabled:               {}", u.enabled);
    println!("  archive_url:           {}", if u.archive_url.is_empty() { "(not set)" } else { &u.archive_url });
    println!("  install_target:        {}", u.install_target.as_deref().unwrap_or("(not set)"));
    println!("  archive_file_name:     {}", u.archive_file_name);
    println!("  archive_root:          {}", u.archive_root.as_deref().unwrap_or("(auto)"));
    println!("  timeout_secs:          {}", u.timeout_secs);
    println!();
    match config_file_path() {
        Some(path) => println!("  Config file: {}", path.display()),
        None => println!("  Config file: (none, using defaults)"),
    }
    0
}

fn print_help() {
    println!("payload-loader - payload loader / self-updater");
    println!();
    println!("USAGE:");
    println!("  payload-loader [--config <path>] [--target <dir>] <command> [--json]");
    println!();
    println!("COMMANDS:");
    println!("  check                       Compare running version with published versions");
    println!("  update                      Download and install the latest payload");
    println!("  config                      Show loader configuration");
    println!("  help                        This help message");
    println!();
    println!("OPTIONS:");
    println!("  --config <path>             Use this loader.toml");
    println!("  --target <dir>              Override the payload install directory");
    println!("  --json                      Machine readable output");
    println!();
    println!("ENVIRONMENT:");
    println!("  PAYLOAD_INJECTION_PATH      Payload install directory");
    println!("  RUST_LOG                    Log filter (default: info)");
}
