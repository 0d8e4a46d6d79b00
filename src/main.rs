use anyhow::{bail, Context, Result};
use bevy::app::ScheduleRunnerPlugin;
use bevy::log::LogPlugin;
use bevy::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use sr_weave::runtime::simulated::SimulatedRuntime;
use sr_weave::{AppConfig, ExitStatus, SceneSource, SimulatedPlatform, StereoWeavePlugin};

/// Frame pacing of the host loop
const FRAME_INTERVAL: Duration = Duration::from_micros(16_667);

#[derive(Debug, Default)]
struct CliArgs {
    image: Option<PathBuf>,
    config: Option<PathBuf>,
    console: bool,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<CliArgs> {
    let mut cli = CliArgs::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-console" | "--console" => cli.console = true,
            "--config" => {
                let path = args.next().context("--config needs a path")?;
                cli.config = Some(PathBuf::from(path));
            }
            flag if flag.starts_with("--") => bail!("unknown option '{}'", flag),
            _ if cli.image.is_none() => cli.image = Some(PathBuf::from(arg)),
            _ => bail!("unexpected argument '{}'", arg),
        }
    }
    Ok(cli)
}

#[cfg(target_os = "windows")]
fn attach_console() {
    // SAFETY: AllocConsole has no preconditions; failure just means a console already exists.
    unsafe {
        winapi::um::consoleapi::AllocConsole();
    }
}

#[cfg(not(target_os = "windows"))]
fn attach_console() {}

fn main() -> AppExit {
    let mut app = App::new();
    app.add_plugins((
        MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(FRAME_INTERVAL)),
        LogPlugin::default(),
    ));

    let cli = match parse_args(std::env::args().skip(1)) {
        Ok(cli) => cli,
        Err(e) => {
            error!("❌ {:#}", e);
            error!("Usage: sr-weave-demo [IMAGE] [-console] [--config PATH]");
            return AppExit::from(ExitStatus::RuntimeInit);
        }
    };
    if cli.console {
        attach_console();
    }

    let config = match AppConfig::load(cli.config.as_deref()) {
        Ok((config, _)) => config,
        Err(e) => {
            error!("❌ Configuration rejected: {}", e);
            return AppExit::from(ExitStatus::RuntimeInit);
        }
    };

    info!("🥽 {} starting", config.window.title);
    let runtime = Arc::new(SimulatedRuntime::new(config.simulation.settings()));
    let platform = SimulatedPlatform::new(runtime).with_eye_tracker(config.simulation.eye_stream_period());
    let scene = SceneSource::from_config(&config, cli.image);

    info!("Console: esc, f11, tab, c, resize <w> <h>, minimize, restore");
    app.add_plugins(StereoWeavePlugin::new(config, Box::new(platform), scene).with_console());
    app.run()
}
