use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::warn;

/// A connected display as a named rectangle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Screen {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub x: u32,
    pub y: u32,
}

impl Screen {
    /// Geometry in the `X0xY0xWxH` form the engine's `--window` flag takes.
    pub fn geometry(&self) -> String {
        format!("{}x{}x{}x{}", self.x, self.y, self.width, self.height)
    }
}

fn fallback_screens() -> Vec<Screen> {
    vec![Screen {
        name: "eDP-1".to_owned(),
        width: 1920,
        height: 1080,
        x: 0,
        y: 0,
    }]
}

/// Enumerates connected displays via `xrandr --query`. Any failure, or an
/// output with no usable lines, degrades to a single default screen.
pub async fn detect_screens() -> Vec<Screen> {
    let output = Command::new("xrandr")
        .arg("--query")
        .stdin(Stdio::null())
        .output()
        .await;
    let screens = match output {
        Ok(output) => parse_xrandr(&String::from_utf8_lossy(&output.stdout)),
        Err(err) => {
            warn!(%err, "screen detection failed");
            Vec::new()
        }
    };
    if screens.is_empty() {
        fallback_screens()
    } else {
        screens
    }
}

/// Extracts `NAME connected [primary] WxH+X+Y` lines.
pub fn parse_xrandr(output: &str) -> Vec<Screen> {
    let mut screens = Vec::new();
    for line in output.lines() {
        let mut tokens = line.split_whitespace();
        let Some(name) = tokens.next() else { continue };
        if tokens.next() != Some("connected") {
            continue;
        }
        let Some(mut mode) = tokens.next() else { continue };
        if mode == "primary" {
            match tokens.next() {
                Some(next) => mode = next,
                None => continue,
            }
        }
        if let Some((width, height, x, y)) = parse_mode(mode) {
            screens.push(Screen {
                name: name.to_owned(),
                width,
                height,
                x,
                y,
            });
        }
    }
    screens
}

fn parse_mode(token: &str) -> Option<(u32, u32, u32, u32)> {
    let (size, offsets) = token.split_once('+')?;
    let (width, height) = size.split_once('x')?;
    let (x, y) = offsets.split_once('+')?;
    Some((
        width.parse().ok()?,
        height.parse().ok()?,
        x.parse().ok()?,
        y.parse().ok()?,
    ))
}
