use anyhow::Context;
use canvas_harvest::download::{DirectorySink, DownloadSink};
use canvas_harvest::virtual_viewer::VirtualViewer;
use canvas_harvest::{DelayTime, DownloadMode, HarvestConfig, Harvester, HarvesterHandle, ImageFormat, Viewport};
use clap::{Parser, ValueEnum};
use log::{error, info, warn};
use std::io::{self, BufRead};
use std::path::PathBuf;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Jpeg,
    Png,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DownloadArg {
    /// Let the browser save pages through download links
    Anchor,
    /// Write pages into --out
    Directory,
}

/// Save every page of a volume open in the NFBR web viewer.
///
/// Commands on stdin: start, delay <secs>, volume <name>, status, quit.
#[derive(Debug, Parser)]
#[command(name = "canvas-harvest", version)]
struct Args {
    /// Viewer URL to open
    #[arg(long, required_unless_present = "dry_run")]
    url: Option<String>,

    /// Output directory for --download directory
    #[arg(long, default_value = ".")]
    out: PathBuf,

    /// Delay between scrolling a page into view and capturing it, in seconds (2-20)
    #[arg(long)]
    delay: Option<f64>,

    /// Volume name used as the file name prefix (default: document title)
    #[arg(long)]
    volume: Option<String>,

    #[arg(long, value_enum, default_value = "jpeg")]
    format: FormatArg,

    /// JPEG quality between 0 and 1
    #[arg(long, default_value_t = 0.95, value_parser = parse_quality)]
    quality: f32,

    #[arg(long)]
    headless: bool,

    /// Browser profile directory (keeps sign-in and viewer settings)
    #[arg(long)]
    user_data_dir: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "directory")]
    download: DownloadArg,

    /// Start as soon as the viewer is ready and exit when done
    #[arg(long)]
    auto_start: bool,

    #[arg(long, default_value_t = 1280)]
    width: u32,

    #[arg(long, default_value_t = 720)]
    height: u32,

    #[arg(long, default_value_t = 30000)]
    timeout_ms: u64,

    /// Run against an in-memory viewer with this many pages instead of a browser
    #[arg(long, value_name = "PAGES")]
    dry_run: Option<usize>,
}

fn parse_quality(s: &str) -> Result<f32, String> {
    let q: f32 = s.parse().map_err(|e| format!("{}", e))?;
    if (0.0..=1.0).contains(&q) {
        Ok(q)
    } else {
        Err(format!("quality must be between 0 and 1, got {}", q))
    }
}

impl Args {
    fn to_config(&self) -> anyhow::Result<HarvestConfig> {
        let delay = self
            .delay
            .map(DelayTime::from_seconds)
            .transpose()
            .context("invalid --delay")?;
        let format = match self.format {
            FormatArg::Jpeg => ImageFormat::Jpeg { quality: self.quality },
            FormatArg::Png => ImageFormat::Png,
        };
        Ok(HarvestConfig {
            viewport: Viewport { width: self.width, height: self.height },
            timeout_ms: self.timeout_ms,
            headless: self.headless,
            user_data_dir: self.user_data_dir.clone(),
            output_dir: self.out.clone(),
            format,
            download: match self.download {
                DownloadArg::Anchor => DownloadMode::Anchor,
                DownloadArg::Directory => DownloadMode::Directory,
            },
            delay,
            volume_name: self.volume.clone(),
            auto_start: self.auto_start,
            exit_after_sweep: true,
        })
    }
}

/// A line typed on stdin
#[derive(Debug, PartialEq)]
enum LineCommand {
    Start,
    Delay(String),
    Volume(String),
    Status,
    Quit,
}

fn parse_command(line: &str) -> Result<Option<LineCommand>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((w, r)) => (w, r.trim()),
        None => (line, ""),
    };
    let cmd = match word.to_ascii_lowercase().as_str() {
        "start" => LineCommand::Start,
        "delay" if !rest.is_empty() => LineCommand::Delay(rest.to_string()),
        "delay" => return Err("usage: delay <seconds>".into()),
        "volume" => LineCommand::Volume(rest.to_string()),
        "status" => LineCommand::Status,
        "quit" | "exit" => LineCommand::Quit,
        other => return Err(format!("unknown command: {}", other)),
    };
    Ok(Some(cmd))
}

async fn handle_line(handle: &HarvesterHandle, line: &str) -> canvas_harvest::Result<()> {
    let cmd = match parse_command(line) {
        Ok(Some(cmd)) => cmd,
        Ok(None) => return Ok(()),
        Err(msg) => {
            warn!("{}", msg);
            return Ok(());
        }
    };

    match cmd {
        LineCommand::Start => {
            // The sweep runs for a while; keep reading commands meanwhile
            let h = handle.clone();
            tokio::spawn(async move {
                match h.start().await {
                    Ok(report) => info!(
                        "Sweep finished: {} exported, {} total, {} passes ({:?})",
                        report.exported, report.total_downloaded, report.passes, report.outcome
                    ),
                    Err(e) => warn!("{}", e),
                }
            });
        }
        LineCommand::Delay(secs) => {
            if let Ok(delay) = handle.set_delay(&secs).await {
                info!("Delay set to {} seconds", delay);
            }
        }
        LineCommand::Volume(name) => handle.set_volume_name(&name).await?,
        LineCommand::Status => println!("{}", handle.status().await?),
        LineCommand::Quit => handle.shutdown().await?,
    }
    Ok(())
}

#[cfg(feature = "cdp")]
async fn spawn_browser(url: String, config: HarvestConfig) -> canvas_harvest::Result<Harvester> {
    use canvas_harvest::cdp::CdpViewer;

    Harvester::spawn(config, move |cfg| {
        let mut viewer = CdpViewer::launch(cfg)?;
        viewer.open(&url)?;
        let sink: Box<dyn DownloadSink> = match cfg.download {
            DownloadMode::Anchor => Box::new(viewer.anchor_sink()),
            DownloadMode::Directory => Box::new(DirectorySink::new(&cfg.output_dir)?),
        };
        Ok((viewer, sink))
    })
    .await
}

#[cfg(not(feature = "cdp"))]
async fn spawn_browser(_url: String, _config: HarvestConfig) -> canvas_harvest::Result<Harvester> {
    Err(canvas_harvest::Error::ConfigError(
        "built without the `cdp` feature; only --dry-run is available".into(),
    ))
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = args.to_config()?;

    let harvester = match (args.dry_run, args.url.clone()) {
        (Some(pages), _) => {
            Harvester::spawn(config, move |cfg| {
                let sink: Box<dyn DownloadSink> = Box::new(DirectorySink::new(&cfg.output_dir)?);
                Ok((VirtualViewer::new(pages).with_title("Dry Run"), sink))
            })
            .await?
        }
        (None, Some(url)) => spawn_browser(url, config).await?,
        (None, None) => anyhow::bail!("--url is required"),
    };

    let handle = harvester.handle();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    let finished = harvester.wait();
    tokio::pin!(finished);
    let mut stdin_open = true;

    loop {
        tokio::select! {
            res = &mut finished => {
                res?;
                return Ok(());
            }
            line = rx.recv(), if stdin_open => match line {
                Some(line) => handle_line(&handle, &line).await?,
                None => stdin_open = false,
            },
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_parse() {
        assert_eq!(parse_command("  start "), Ok(Some(LineCommand::Start)));
        assert_eq!(parse_command("delay 3.5"), Ok(Some(LineCommand::Delay("3.5".into()))));
        assert_eq!(parse_command("volume My Book 2"), Ok(Some(LineCommand::Volume("My Book 2".into()))));
        assert_eq!(parse_command("volume"), Ok(Some(LineCommand::Volume(String::new()))));
        assert_eq!(parse_command("QUIT"), Ok(Some(LineCommand::Quit)));
        assert_eq!(parse_command(""), Ok(None));
        assert!(parse_command("delay").is_err());
        assert!(parse_command("jump 4").is_err());
    }

    #[test]
    fn args_build_config() {
        let args = Args::parse_from([
            "canvas-harvest",
            "--url",
            "https://viewer.example/read",
            "--delay",
            "4",
            "--format",
            "png",
            "--download",
            "anchor",
        ]);
        let cfg = args.to_config().unwrap();
        assert_eq!(cfg.delay.unwrap().as_millis(), 4000);
        assert_eq!(cfg.format, ImageFormat::Png);
        assert_eq!(cfg.download, DownloadMode::Anchor);

        let args = Args::parse_from(["canvas-harvest", "--dry-run", "3", "--delay", "1"]);
        assert!(args.to_config().is_err());
        assert!(Args::try_parse_from(["canvas-harvest"]).is_err());
        assert!(Args::try_parse_from(["canvas-harvest", "--dry-run", "2", "--quality", "1.5"]).is_err());
    }
}
