use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::properties::PropertyRecord;
use crate::screens::Screen;
use crate::store::normalize_value;

pub const DEFAULT_VOLUME: u32 = 15;
pub const DEFAULT_FPS: u32 = 30;
pub const DEFAULT_SCALING: &str = "default";
pub const DEFAULT_CLAMP: &str = "clamp";

/// Geometry used in windowed mode when the selected display is unknown.
pub const FALLBACK_GEOMETRY: &str = "0x0x1920x1080";

/// Everything the user picked for one apply: the item, the target display
/// and the audio/performance/scaling switches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub background_id: String,
    pub screen: String,
    pub windowed: bool,
    pub silent: bool,
    pub volume: u32,
    pub noautomute: bool,
    pub no_audio_processing: bool,
    pub fps: u32,
    pub disable_mouse: bool,
    pub disable_parallax: bool,
    pub no_fullscreen_pause: bool,
    pub scaling: String,
    pub clamp: String,
    pub custom_args: String,
}

impl Default for Selection {
    fn default() -> Self {
        Self {
            background_id: String::new(),
            screen: String::new(),
            windowed: false,
            silent: false,
            volume: DEFAULT_VOLUME,
            noautomute: false,
            no_audio_processing: false,
            fps: DEFAULT_FPS,
            disable_mouse: false,
            disable_parallax: false,
            no_fullscreen_pause: false,
            scaling: DEFAULT_SCALING.to_owned(),
            clamp: DEFAULT_CLAMP.to_owned(),
            custom_args: String::new(),
        }
    }
}

impl Selection {
    pub fn from_last(last: &LastSelection) -> Self {
        Self {
            background_id: last.background_id.clone(),
            screen: last.screen.clone(),
            windowed: last.windowed_mode,
            silent: last.silent,
            volume: last.volume,
            custom_args: last.custom_args.clone(),
            ..Self::default()
        }
    }

    pub fn to_last(&self) -> LastSelection {
        LastSelection {
            background_id: self.background_id.clone(),
            screen: self.screen.clone(),
            silent: self.silent,
            volume: self.volume,
            custom_args: self.custom_args.clone(),
            windowed_mode: self.windowed,
        }
    }
}

fn default_volume() -> u32 {
    DEFAULT_VOLUME
}

/// The persisted snapshot of the most recently applied selection, replayed
/// at the next startup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LastSelection {
    #[serde(default)]
    pub background_id: String,
    #[serde(default)]
    pub screen: String,
    #[serde(default)]
    pub silent: bool,
    #[serde(default = "default_volume")]
    pub volume: u32,
    #[serde(default)]
    pub custom_args: String,
    #[serde(default)]
    pub windowed_mode: bool,
}

/// Builds the engine argument vector for one apply. Pure and deterministic;
/// flags matching their documented defaults are suppressed. Custom args are
/// split on whitespace and passed through untouched.
pub fn synthesize(
    selection: &Selection,
    screens: &[Screen],
    properties: &BTreeMap<String, PropertyRecord>,
) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();

    if selection.windowed {
        let geometry = screens
            .iter()
            .find(|screen| screen.name == selection.screen)
            .map(Screen::geometry)
            .unwrap_or_else(|| FALLBACK_GEOMETRY.to_owned());
        args.push("--window".to_owned());
        args.push(geometry);
    } else {
        args.push("--screen-root".to_owned());
        args.push(selection.screen.clone());
    }

    args.push("--bg".to_owned());
    args.push(selection.background_id.clone());

    if selection.silent {
        args.push("--silent".to_owned());
    } else if selection.volume != DEFAULT_VOLUME {
        args.push("--volume".to_owned());
        args.push(selection.volume.to_string());
    }
    if selection.noautomute {
        args.push("--noautomute".to_owned());
    }
    if selection.no_audio_processing {
        args.push("--no-audio-processing".to_owned());
    }

    if selection.fps != DEFAULT_FPS {
        args.push("--fps".to_owned());
        args.push(selection.fps.to_string());
    }
    if selection.disable_mouse {
        args.push("--disable-mouse".to_owned());
    }
    if selection.disable_parallax {
        args.push("--disable-parallax".to_owned());
    }
    if selection.no_fullscreen_pause {
        args.push("--no-fullscreen-pause".to_owned());
    }

    if selection.scaling != DEFAULT_SCALING {
        args.push("--scaling".to_owned());
        args.push(selection.scaling.clone());
    }
    if selection.clamp != DEFAULT_CLAMP {
        args.push("--clamp".to_owned());
        args.push(selection.clamp.clone());
    }

    for (name, record) in properties {
        args.push("--set-property".to_owned());
        args.push(format!("{name}{}{}", record.sep, normalize_value(&record.value)));
    }

    args.extend(selection.custom_args.split_whitespace().map(str::to_owned));
    args
}
