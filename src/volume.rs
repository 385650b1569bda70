//! Channel maps, per-channel volumes and the helpers that convert between them
//!
//! Positions use the audio server's numbering (mono = 0 … top-rear-center = 50)
//! because that numbering is what the record format and the control surface
//! carry on the wire.

use std::fmt;
use std::str::FromStr;

/// Linear software volume value
pub type Volume = u32;

pub const VOLUME_MUTED: Volume = 0;
/// Unity gain
pub const VOLUME_NORM: Volume = 0x10000;
pub const VOLUME_MAX: Volume = u32::MAX / 2;
/// Maximum number of channels in a map or volume
pub const CHANNELS_MAX: usize = 32;
/// Number of distinct channel position values
pub const POSITION_MAX: u32 = 51;

const AUX_BASE: u8 = 12;
const AUX_COUNT: u8 = 32;

/// Logical speaker position of one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChannelPosition {
    Mono,
    FrontLeft,
    FrontRight,
    FrontCenter,
    RearCenter,
    RearLeft,
    RearRight,
    Lfe,
    FrontLeftOfCenter,
    FrontRightOfCenter,
    SideLeft,
    SideRight,
    /// Auxiliary channel 0..=31
    Aux(u8),
    TopCenter,
    TopFrontLeft,
    TopFrontRight,
    TopFrontCenter,
    TopRearLeft,
    TopRearRight,
    TopRearCenter,
}

/// Region of the sound stage a position belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
    Center,
    Lfe,
}

impl ChannelPosition {
    /// Decode a raw wire position
    pub fn from_raw(raw: u32) -> Option<Self> {
        use ChannelPosition::*;
        let pos = match raw {
            0 => Mono,
            1 => FrontLeft,
            2 => FrontRight,
            3 => FrontCenter,
            4 => RearCenter,
            5 => RearLeft,
            6 => RearRight,
            7 => Lfe,
            8 => FrontLeftOfCenter,
            9 => FrontRightOfCenter,
            10 => SideLeft,
            11 => SideRight,
            12..=43 => Aux((raw - AUX_BASE as u32) as u8),
            44 => TopCenter,
            45 => TopFrontLeft,
            46 => TopFrontRight,
            47 => TopFrontCenter,
            48 => TopRearLeft,
            49 => TopRearRight,
            50 => TopRearCenter,
            _ => return None,
        };
        Some(pos)
    }

    /// Raw wire position; out-of-range aux channels yield an invalid value
    pub fn to_raw(self) -> u8 {
        use ChannelPosition::*;
        match self {
            Mono => 0,
            FrontLeft => 1,
            FrontRight => 2,
            FrontCenter => 3,
            RearCenter => 4,
            RearLeft => 5,
            RearRight => 6,
            Lfe => 7,
            FrontLeftOfCenter => 8,
            FrontRightOfCenter => 9,
            SideLeft => 10,
            SideRight => 11,
            Aux(n) => AUX_BASE.saturating_add(n),
            TopCenter => 44,
            TopFrontLeft => 45,
            TopFrontRight => 46,
            TopFrontCenter => 47,
            TopRearLeft => 48,
            TopRearRight => 49,
            TopRearCenter => 50,
        }
    }

    pub fn is_valid(self) -> bool {
        match self {
            ChannelPosition::Aux(n) => n < AUX_COUNT,
            _ => true,
        }
    }

    /// Regions the position counts toward, most specific first.
    ///
    /// Positions beside the center count toward both their side and the
    /// center; mono and aux positions belong to none.
    pub fn sides(self) -> &'static [Side] {
        use ChannelPosition::*;
        match self {
            FrontLeftOfCenter => &[Side::Left, Side::Center],
            FrontRightOfCenter => &[Side::Right, Side::Center],
            FrontLeft | RearLeft | SideLeft | TopFrontLeft | TopRearLeft => &[Side::Left],
            FrontRight | RearRight | SideRight | TopFrontRight | TopRearRight => &[Side::Right],
            FrontCenter | RearCenter | TopCenter | TopFrontCenter | TopRearCenter => &[Side::Center],
            Lfe => &[Side::Lfe],
            Mono | Aux(_) => &[],
        }
    }

    pub fn is_on(self, side: Side) -> bool {
        self.sides().contains(&side)
    }

    fn name(self) -> std::borrow::Cow<'static, str> {
        use ChannelPosition::*;
        let name = match self {
            Mono => "mono",
            FrontLeft => "front-left",
            FrontRight => "front-right",
            FrontCenter => "front-center",
            RearCenter => "rear-center",
            RearLeft => "rear-left",
            RearRight => "rear-right",
            Lfe => "lfe",
            FrontLeftOfCenter => "front-left-of-center",
            FrontRightOfCenter => "front-right-of-center",
            SideLeft => "side-left",
            SideRight => "side-right",
            Aux(n) => return format!("aux{}", n).into(),
            TopCenter => "top-center",
            TopFrontLeft => "top-front-left",
            TopFrontRight => "top-front-right",
            TopFrontCenter => "top-front-center",
            TopRearLeft => "top-rear-left",
            TopRearRight => "top-rear-right",
            TopRearCenter => "top-rear-center",
        };
        name.into()
    }
}

impl fmt::Display for ChannelPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for ChannelPosition {
    type Err = String;

    /// Accepts position names (`front-left`), the short forms `fl`/`fr`/`fc`
    /// and raw numbers.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        if let Ok(raw) = s.parse::<u32>() {
            return Self::from_raw(raw).ok_or_else(|| format!("invalid channel position {}", raw));
        }
        let short = match s.as_str() {
            "fl" => Some(ChannelPosition::FrontLeft),
            "fr" => Some(ChannelPosition::FrontRight),
            "fc" => Some(ChannelPosition::FrontCenter),
            "rl" => Some(ChannelPosition::RearLeft),
            "rr" => Some(ChannelPosition::RearRight),
            "sl" => Some(ChannelPosition::SideLeft),
            "sr" => Some(ChannelPosition::SideRight),
            _ => None,
        };
        if let Some(pos) = short {
            return Ok(pos);
        }
        (0..POSITION_MAX)
            .filter_map(Self::from_raw)
            .find(|p| p.name() == s.as_str())
            .ok_or_else(|| format!("unknown channel position '{}'", s))
    }
}

/// Ordered list of channel positions
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ChannelMap(Vec<ChannelPosition>);

impl ChannelMap {
    pub fn new(positions: Vec<ChannelPosition>) -> Self {
        Self(positions)
    }

    pub fn mono() -> Self {
        Self(vec![ChannelPosition::Mono])
    }

    pub fn stereo() -> Self {
        Self(vec![ChannelPosition::FrontLeft, ChannelPosition::FrontRight])
    }

    pub fn channels(&self) -> usize {
        self.0.len()
    }

    pub fn positions(&self) -> &[ChannelPosition] {
        &self.0
    }

    /// Between 1 and [`CHANNELS_MAX`] positions, each one valid
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty() && self.0.len() <= CHANNELS_MAX && self.0.iter().all(|p| p.is_valid())
    }
}

impl fmt::Display for ChannelMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.0.iter().map(|p| p.to_string()).collect();
        f.write_str(&names.join(","))
    }
}

/// Per-channel volume vector
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct CVolume(Vec<Volume>);

impl CVolume {
    pub fn new(values: Vec<Volume>) -> Self {
        Self(values)
    }

    /// Same value on every channel
    pub fn uniform(channels: usize, value: Volume) -> Self {
        Self(vec![value; channels])
    }

    pub fn channels(&self) -> usize {
        self.0.len()
    }

    pub fn values(&self) -> &[Volume] {
        &self.0
    }

    pub fn is_valid(&self) -> bool {
        !self.0.is_empty() && self.0.len() <= CHANNELS_MAX && self.0.iter().all(|v| *v <= VOLUME_MAX)
    }

    pub fn is_compatible_with(&self, map: &ChannelMap) -> bool {
        self.is_valid() && self.channels() == map.channels()
    }

    /// Arithmetic mean of all channels (0 for an empty volume)
    pub fn avg(&self) -> Volume {
        average(self.0.iter().copied()).unwrap_or(VOLUME_MUTED)
    }

    /// Map this volume, laid out according to `from`, onto the channel layout `to`.
    ///
    /// Each target channel takes the mean of the source channels at the same
    /// position; failing that, the mean of the source channels on the same side;
    /// failing that, the mean of the whole volume.
    pub fn remap(&self, from: &ChannelMap, to: &ChannelMap) -> CVolume {
        if from == to {
            return self.clone();
        }

        let source: Vec<(ChannelPosition, Volume)> = from
            .positions()
            .iter()
            .copied()
            .zip(self.0.iter().copied())
            .collect();

        let values = to
            .positions()
            .iter()
            .map(|target| {
                if let Some(v) = average(
                    source
                        .iter()
                        .filter(|(p, _)| p == target)
                        .map(|(_, v)| *v),
                ) {
                    return v;
                }
                for &side in target.sides() {
                    if let Some(v) = average(
                        source
                            .iter()
                            .filter(|(p, _)| p.is_on(side))
                            .map(|(_, v)| *v),
                    ) {
                        return v;
                    }
                }
                self.avg()
            })
            .collect();

        CVolume(values)
    }
}

impl fmt::Display for CVolume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|v| format!("{}%", (*v as u64 * 100 + VOLUME_NORM as u64 / 2) / VOLUME_NORM as u64))
            .collect();
        f.write_str(&parts.join(" "))
    }
}

fn average(values: impl Iterator<Item = Volume>) -> Option<Volume> {
    let (sum, n) = values.fold((0u64, 0u64), |(sum, n), v| (sum + v as u64, n + 1));
    if n == 0 {
        None
    } else {
        Some((sum / n) as Volume)
    }
}

/// Convert a decibel value into a software volume using the cubic volume curve
pub fn volume_from_db(db: f64) -> Volume {
    if db.is_nan() || db == f64::NEG_INFINITY {
        return VOLUME_MUTED;
    }
    let linear = 10f64.powf(db / 20.0);
    if linear <= 0.0 {
        return VOLUME_MUTED;
    }
    let v = (linear.cbrt() * VOLUME_NORM as f64).round();
    if v >= VOLUME_MAX as f64 {
        VOLUME_MAX
    } else {
        v as Volume
    }
}
