//! Playback option bag attached to a media record.
//!
//! Stored as a JSON text column. Known toggles are explicit fields so a typo
//! in a key cannot silently create a new flag; anything else lands in `extra`,
//! which keeps its insertion order across a save/load round trip.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const OPTIONS_VERSION: u32 = 1;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VideoOptions {
    #[serde(default = "current_version")]
    pub version: u32,

    #[serde(default)]
    pub autoplay: bool,

    #[serde(default, rename = "loop")]
    pub loop_playback: bool,

    #[serde(default)]
    pub hide_controls: bool,

    #[serde(default)]
    pub hide_fullscreen: bool,

    /// Open extension keys, order preserved.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Partial update for [`VideoOptions`]. Absent fields leave the stored value
/// alone.
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct OptionsPatch {
    pub autoplay: Option<bool>,

    #[serde(rename = "loop")]
    pub loop_playback: Option<bool>,

    pub hide_controls: Option<bool>,

    pub hide_fullscreen: Option<bool>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn current_version() -> u32 {
    OPTIONS_VERSION
}

impl Default for VideoOptions {
    fn default() -> Self {
        Self {
            version: OPTIONS_VERSION,
            autoplay: false,
            loop_playback: false,
            hide_controls: false,
            hide_fullscreen: false,
            extra: Map::new(),
        }
    }
}

impl VideoOptions {
    /// Merge `patch` into `self`. Keys not named by the patch are preserved.
    pub fn apply(&mut self, patch: OptionsPatch) {
        if let Some(v) = patch.autoplay {
            self.autoplay = v;
        }
        if let Some(v) = patch.loop_playback {
            self.loop_playback = v;
        }
        if let Some(v) = patch.hide_controls {
            self.hide_controls = v;
        }
        if let Some(v) = patch.hide_fullscreen {
            self.hide_fullscreen = v;
        }
        // `version` is owned by the server
        for (key, value) in patch.extra {
            if key != "version" {
                self.extra.insert(key, value);
            }
        }
        self.version = OPTIONS_VERSION;
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse a stored bag. Empty text is treated as the default bag.
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(raw)
    }
}
