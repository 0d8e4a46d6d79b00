//! Bevy host for the stereo app
//!
//! [`StereoWeavePlugin`] brings the app up in `Startup`, feeds it window
//! events from the console reader, drives one frame per `Update` and shuts
//! it down once an [`AppExit`] is written. Fatal errors become `AppExit`
//! with their exit status.

use bevy::math::UVec2;
use bevy::prelude::*;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::io::BufRead;

use crate::app::{AppControl, Platform, SceneSource, StereoApp};
use crate::config::AppConfig;
use crate::error::{AppError, ExitStatus};
use crate::window::{Key, WindowEvent};

/// Everything bring-up consumes, handed over once
struct Launch {
    config: AppConfig,
    platform: Box<dyn Platform>,
    scene: SceneSource,
}

pub struct StereoWeavePlugin {
    launch: Mutex<Option<Launch>>,
    console: bool,
}

impl StereoWeavePlugin {
    pub fn new(config: AppConfig, platform: Box<dyn Platform>, scene: SceneSource) -> Self {
        Self {
            launch: Mutex::new(Some(Launch {
                config,
                platform,
                scene,
            })),
            console: false,
        }
    }

    /// Read window events from stdin
    pub fn with_console(mut self) -> Self {
        self.console = true;
        self
    }
}

impl Plugin for StereoWeavePlugin {
    fn build(&self, app: &mut App) {
        let Some(launch) = self.launch.lock().take() else {
            warn!("⚠️ StereoWeavePlugin built twice, ignoring");
            return;
        };

        let (tx, rx) = unbounded::<WindowEvent>();
        if self.console {
            spawn_console_reader(tx.clone());
        }

        app.insert_non_send_resource(PendingLaunch(launch))
            .insert_resource(ConsoleCommands { tx, rx })
            .add_systems(Startup, bring_up_app)
            .add_systems(Update, drive_app)
            .add_systems(Last, shutdown_on_exit);
    }
}

struct PendingLaunch(Launch);

/// Window events waiting for the app
#[derive(Resource)]
pub struct ConsoleCommands {
    tx: Sender<WindowEvent>,
    rx: Receiver<WindowEvent>,
}

impl ConsoleCommands {
    /// Queue an event as if it came from the window system
    pub fn sender(&self) -> Sender<WindowEvent> {
        self.tx.clone()
    }
}

/// Map a console line to a window event
///
/// `esc`, `f11`, `tab` and `c` act like the keys; `resize <w> <h>`,
/// `minimize`, `restore`, `paint` and `close` like the window messages.
pub fn parse_console_line(line: &str) -> Option<WindowEvent> {
    let mut words = line.split_whitespace();
    let command = words.next()?.to_ascii_lowercase();
    let event = match command.as_str() {
        "esc" | "escape" | "quit" | "q" => WindowEvent::KeyDown(Key::Escape),
        "f11" | "fullscreen" => WindowEvent::KeyDown(Key::F11),
        "tab" => WindowEvent::KeyDown(Key::Tab),
        "c" => WindowEvent::KeyDown(Key::Char('c')),
        "minimize" => WindowEvent::Minimized,
        "restore" => WindowEvent::Restored,
        "paint" => WindowEvent::Paint,
        "close" => WindowEvent::CloseRequested,
        "resize" => {
            let width = words.next()?.parse().ok()?;
            let height = words.next()?.parse().ok()?;
            WindowEvent::Resized(UVec2::new(width, height))
        }
        _ => return None,
    };
    Some(event)
}

fn spawn_console_reader(tx: Sender<WindowEvent>) {
    let spawned = std::thread::Builder::new()
        .name("sr-console".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                match parse_console_line(&line) {
                    Some(event) => {
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                    None if line.trim().is_empty() => {}
                    None => warn!("Unknown console command '{}'", line.trim()),
                }
            }
            debug!("Console reader finished");
        });
    if let Err(e) = spawned {
        warn!("⚠️ Console reader not started: {}", e);
    }
}

fn fail(exit: &mut EventWriter<AppExit>, error: AppError) {
    let status = error.exit_status();
    error!("❌ {}: {}", status, error);
    exit.write(AppExit::from(status));
}

fn bring_up_app(world: &mut World) {
    let Some(PendingLaunch(launch)) = world.remove_non_send_resource::<PendingLaunch>() else {
        return;
    };

    match StereoApp::bring_up(launch.config, launch.platform, launch.scene) {
        Ok(app) => world.insert_non_send_resource(app),
        Err(e) => {
            let status = e.exit_status();
            error!("❌ {}: {}", status, e);
            world.send_event(AppExit::from(status));
        }
    }
}

/// Apply queued window events, then run one frame unless the app is exiting
fn drive_app(
    time: Res<Time>,
    commands: Res<ConsoleCommands>,
    app: Option<NonSendMut<StereoApp>>,
    mut exit: EventWriter<AppExit>,
) {
    let Some(mut app) = app else {
        return;
    };
    for event in commands.rx.try_iter() {
        match app.handle_window_event(event) {
            Ok(AppControl::Continue) => {}
            Ok(AppControl::Exit(status)) => {
                exit.write(AppExit::from(status));
                return;
            }
            Err(e) => {
                fail(&mut exit, e);
                return;
            }
        }
    }
    if let Err(e) = app.frame(time.delta()) {
        fail(&mut exit, e);
    }
}

fn shutdown_on_exit(mut exits: EventReader<AppExit>, app: Option<NonSendMut<StereoApp>>) {
    if exits.read().next().is_none() {
        return;
    }
    if let Some(mut app) = app {
        app.shutdown();
    }
}

/// Exit status carried by a finished app run
pub fn exit_status_of(exit: &AppExit) -> u8 {
    match exit {
        AppExit::Success => ExitStatus::Success.code(),
        AppExit::Error(code) => code.get(),
    }
}
