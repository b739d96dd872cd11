//! Generation parameters and their enumerated option sets.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Output aspect ratio; `Auto` lets the upstream pick one.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "auto")]
    Auto,
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "16:9")]
    Landscape16x9,
    #[serde(rename = "9:16")]
    Portrait9x16,
    #[serde(rename = "4:3")]
    Landscape4x3,
    #[serde(rename = "3:4")]
    Portrait3x4,
    #[serde(rename = "3:2")]
    Landscape3x2,
    #[serde(rename = "2:3")]
    Portrait2x3,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 8] = [
        AspectRatio::Auto,
        AspectRatio::Square,
        AspectRatio::Landscape16x9,
        AspectRatio::Portrait9x16,
        AspectRatio::Landscape4x3,
        AspectRatio::Portrait3x4,
        AspectRatio::Landscape3x2,
        AspectRatio::Portrait2x3,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Auto => "auto",
            AspectRatio::Square => "1:1",
            AspectRatio::Landscape16x9 => "16:9",
            AspectRatio::Portrait9x16 => "9:16",
            AspectRatio::Landscape4x3 => "4:3",
            AspectRatio::Portrait3x4 => "3:4",
            AspectRatio::Landscape3x2 => "3:2",
            AspectRatio::Portrait2x3 => "2:3",
        }
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, AspectRatio::Auto)
    }
}

impl FromStr for AspectRatio {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AspectRatio::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| {
                DomainError::validation(format!(
                    "aspect_ratio must be one of: {}",
                    AspectRatio::ALL.map(|r| r.as_str()).join(", ")
                ))
            })
    }
}

impl core::fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output resolution.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "480p")]
    P480,
    #[default]
    #[serde(rename = "720p")]
    P720,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::P480 => "480p",
            Resolution::P720 => "720p",
        }
    }
}

impl FromStr for Resolution {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "480p" => Ok(Resolution::P480),
            "720p" => Ok(Resolution::P720),
            _ => Err(DomainError::validation("resolution must be one of: 480p, 720p")),
        }
    }
}

impl core::fmt::Display for Resolution {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Clip length in seconds (strictly positive).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoDuration(u32);

impl VideoDuration {
    pub const DEFAULT_SECS: u32 = 15;

    pub fn new(secs: i64) -> Result<Self, DomainError> {
        if secs <= 0 {
            return Err(DomainError::validation("duration must be a positive integer"));
        }
        u32::try_from(secs)
            .map(Self)
            .map_err(|_| DomainError::validation("duration is out of range"))
    }

    pub fn secs(&self) -> u32 {
        self.0
    }
}

impl Default for VideoDuration {
    fn default() -> Self {
        Self(Self::DEFAULT_SECS)
    }
}

/// Immutable parameters of one generation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GenerationParams {
    pub duration: VideoDuration,
    pub aspect_ratio: AspectRatio,
    pub resolution: Resolution,
}

impl GenerationParams {
    /// Validate raw (wire/storage) values against the option sets.
    pub fn parse(duration: i64, aspect_ratio: &str, resolution: &str) -> Result<Self, DomainError> {
        Ok(Self {
            duration: VideoDuration::new(duration)?,
            aspect_ratio: aspect_ratio.parse()?,
            resolution: resolution.parse()?,
        })
    }
}
