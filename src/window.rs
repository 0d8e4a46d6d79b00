//! Per-window state and input mapping
//!
//! Window events arrive from whatever pumps messages (an OS window or the
//! console reader). [`WindowState::handle_event`] turns them into commands
//! for the app and keeps the bookkeeping for fullscreen, minimize and modal
//! move/resize in one struct.

use bevy::math::{IVec2, UVec2};
use bevy::prelude::debug;
use std::time::{Duration, Instant};

/// Smallest client area the window may be resized to
pub const MIN_WINDOW_SIZE: UVec2 = UVec2::new(100, 100);

/// How often the FPS counter refreshes the title
pub const TITLE_REFRESH_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Escape,
    F11,
    Tab,
    Char(char),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowEvent {
    KeyDown(Key),
    /// New client size reported by the window system
    Resized(UVec2),
    Minimized,
    Restored,
    EnterSizeMove,
    ExitSizeMove,
    /// Repaint request; the main loop is starved during modal move/resize
    Paint,
    CloseRequested,
}

/// What the app should do in response to a window event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowCommand {
    Close,
    InvalidateContext,
    ToggleEyeSource,
    /// Resize the backbuffer and render one frame right away
    Resize(UVec2),
    /// Render a frame outside the normal loop
    Render,
}

/// Outer window rectangle in desktop coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowRect {
    pub origin: IVec2,
    pub size: UVec2,
}

#[derive(Debug, Clone)]
pub struct WindowState {
    title: String,
    rect: WindowRect,
    monitor: WindowRect,
    minimized: bool,
    fullscreen: bool,
    moving: bool,
    windowed_rect: Option<WindowRect>,
}

impl WindowState {
    pub fn new(title: impl Into<String>, size: UVec2, monitor: WindowRect) -> Self {
        Self {
            title: title.into(),
            rect: WindowRect {
                origin: monitor.origin,
                size: size.max(MIN_WINDOW_SIZE),
            },
            monitor,
            minimized: false,
            fullscreen: false,
            moving: false,
            windowed_rect: None,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn client_size(&self) -> UVec2 {
        self.rect.size
    }

    pub fn rect(&self) -> WindowRect {
        self.rect
    }

    pub fn is_minimized(&self) -> bool {
        self.minimized
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub fn is_moving(&self) -> bool {
        self.moving
    }

    pub fn handle_event(&mut self, event: WindowEvent) -> Option<WindowCommand> {
        match event {
            WindowEvent::KeyDown(key) => self.handle_key(key),
            WindowEvent::Resized(size) => self.resize(size),
            WindowEvent::Minimized => {
                self.minimized = true;
                None
            }
            WindowEvent::Restored => {
                self.minimized = false;
                None
            }
            WindowEvent::EnterSizeMove => {
                self.moving = true;
                None
            }
            WindowEvent::ExitSizeMove => {
                self.moving = false;
                None
            }
            WindowEvent::Paint => self.moving.then_some(WindowCommand::Render),
            WindowEvent::CloseRequested => Some(WindowCommand::Close),
        }
    }

    fn handle_key(&mut self, key: Key) -> Option<WindowCommand> {
        match key {
            Key::Escape => Some(WindowCommand::Close),
            Key::F11 => Some(self.toggle_fullscreen()),
            Key::Tab => Some(WindowCommand::ToggleEyeSource),
            Key::Char('c') | Key::Char('C') => Some(WindowCommand::InvalidateContext),
            Key::Char(_) => None,
        }
    }

    fn resize(&mut self, size: UVec2) -> Option<WindowCommand> {
        if self.minimized {
            return None;
        }
        let size = size.max(MIN_WINDOW_SIZE);
        if size == self.rect.size {
            return None;
        }
        self.rect.size = size;
        Some(WindowCommand::Resize(size))
    }

    /// Switch between a borderless monitor-sized window and the last windowed rectangle
    pub fn toggle_fullscreen(&mut self) -> WindowCommand {
        if self.fullscreen {
            let restored = self.windowed_rect.take().unwrap_or(self.rect);
            self.rect = restored;
            self.fullscreen = false;
        } else {
            self.windowed_rect = Some(self.rect);
            self.rect = self.monitor;
            self.fullscreen = true;
        }
        debug!(
            "Fullscreen {} ({}x{})",
            self.fullscreen, self.rect.size.x, self.rect.size.y
        );
        WindowCommand::Resize(self.rect.size)
    }
}

/// Frame counter refreshing `"<title> (<fps> FPS)"` every quarter second
#[derive(Debug, Clone)]
pub struct FpsCounter {
    interval: Duration,
    window_start: Instant,
    frames: u32,
    fps: f64,
}

impl FpsCounter {
    pub fn new(now: Instant) -> Self {
        Self {
            interval: TITLE_REFRESH_INTERVAL,
            window_start: now,
            frames: 0,
            fps: 0.0,
        }
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Count a frame; returns the new title when the interval has elapsed
    pub fn frame(&mut self, now: Instant, title: &str) -> Option<String> {
        self.frames += 1;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.interval {
            return None;
        }
        self.fps = self.frames as f64 / elapsed.as_secs_f64();
        self.frames = 0;
        self.window_start = now;
        Some(format!("{} ({:.1} FPS)", title, self.fps))
    }
}
