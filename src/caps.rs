//! Capability descriptors and stream parameter negotiation.

/// Stream direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Playback,
    Capture,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Playback => "playback",
            Direction::Capture => "capture",
        }
    }
}

// Discrete sample-rate mask bits, one per conventional rate.
pub const RATE_5512: u32 = 1 << 0;
pub const RATE_8000: u32 = 1 << 1;
pub const RATE_11025: u32 = 1 << 2;
pub const RATE_16000: u32 = 1 << 3;
pub const RATE_22050: u32 = 1 << 4;
pub const RATE_32000: u32 = 1 << 5;
pub const RATE_44100: u32 = 1 << 6;
pub const RATE_48000: u32 = 1 << 7;
pub const RATE_64000: u32 = 1 << 8;
pub const RATE_88200: u32 = 1 << 9;
pub const RATE_96000: u32 = 1 << 10;
pub const RATE_176400: u32 = 1 << 11;
pub const RATE_192000: u32 = 1 << 12;
/// Any rate within `[rate_min, rate_max]`.
pub const RATE_CONTINUOUS: u32 = 1 << 30;
/// Irregular rates within `[rate_min, rate_max]` not on the discrete ladder.
pub const RATE_KNOT: u32 = 1 << 31;

pub const RATE_8000_48000: u32 = RATE_8000
    | RATE_11025
    | RATE_16000
    | RATE_22050
    | RATE_32000
    | RATE_44100
    | RATE_48000;
pub const RATE_8000_96000: u32 = RATE_8000_48000 | RATE_64000 | RATE_88200 | RATE_96000;
pub const RATE_8000_192000: u32 = RATE_8000_96000 | RATE_176400 | RATE_192000;

const KNOWN_RATES: [(u32, u32); 13] = [
    (RATE_5512, 5512),
    (RATE_8000, 8000),
    (RATE_11025, 11025),
    (RATE_16000, 16000),
    (RATE_22050, 22050),
    (RATE_32000, 32000),
    (RATE_44100, 44100),
    (RATE_48000, 48000),
    (RATE_64000, 64000),
    (RATE_88200, 88200),
    (RATE_96000, 96000),
    (RATE_176400, 176400),
    (RATE_192000, 192000),
];

/// Mask bit for an exact discrete rate, `None` if the rate is off the ladder.
pub fn rate_bit(hz: u32) -> Option<u32> {
    KNOWN_RATES
        .iter()
        .find(|(_, rate)| *rate == hz)
        .map(|(bit, _)| *bit)
}

// Sample format mask bits. Bit positions follow the conventional format
// ladder so masks can be exchanged with external descriptors unchanged.
pub const FORMAT_S8: u64 = 1 << 0;
pub const FORMAT_U8: u64 = 1 << 1;
pub const FORMAT_S16_LE: u64 = 1 << 2;
pub const FORMAT_S16_BE: u64 = 1 << 3;
pub const FORMAT_U16_LE: u64 = 1 << 4;
pub const FORMAT_U16_BE: u64 = 1 << 5;
pub const FORMAT_S24_LE: u64 = 1 << 6;
pub const FORMAT_S24_BE: u64 = 1 << 7;
pub const FORMAT_U24_LE: u64 = 1 << 8;
pub const FORMAT_U24_BE: u64 = 1 << 9;
pub const FORMAT_S32_LE: u64 = 1 << 10;
pub const FORMAT_S32_BE: u64 = 1 << 11;

/// What a backend supports for one stream direction.
///
/// Set once at registration time and never mutated. A direction the
/// hardware does not implement is declared with [`StreamCaps::unsupported`]
/// (recognized by `channels_min == 0`).
#[derive(Debug, Clone)]
pub struct StreamCaps {
    /// Power-domain stream name used in start/stop notifications.
    pub stream_name: String,
    pub rate_min: u32,
    pub rate_max: u32,
    /// Bit mask of supported rates.
    pub rates: u32,
    pub channels_min: u32,
    pub channels_max: u32,
    /// Bit mask of supported sample formats.
    pub formats: u64,
}

impl StreamCaps {
    /// Descriptor for a direction the backend does not implement.
    pub fn unsupported() -> Self {
        Self {
            stream_name: String::new(),
            rate_min: 0,
            rate_max: 0,
            rates: 0,
            channels_min: 0,
            channels_max: 0,
            formats: 0,
        }
    }
}

/// Hardware parameters committed by set-params.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HwParams {
    pub rate: u32,
    pub channels: u32,
    /// Single format mask bit.
    pub format: u64,
}

/// The intersection of two endpoint descriptors for one direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiatedConfig {
    pub rate_min: u32,
    pub rate_max: u32,
    pub rates: u32,
    pub channels_min: u32,
    pub channels_max: u32,
    pub formats: u64,
}

impl NegotiatedConfig {
    /// Whether an exact rate lies inside the negotiated configuration.
    pub fn supports_rate(&self, hz: u32) -> bool {
        if hz < self.rate_min || hz > self.rate_max {
            return false;
        }
        if self.rates & (RATE_CONTINUOUS | RATE_KNOT) != 0 {
            return true;
        }
        rate_bit(hz).is_some_and(|bit| self.rates & bit != 0)
    }

    /// Whether a full parameter set lies inside the negotiated configuration.
    pub fn supports(&self, params: &HwParams) -> bool {
        self.supports_rate(params.rate)
            && params.channels >= self.channels_min
            && params.channels <= self.channels_max
            && params.format != 0
            && self.formats & params.format == params.format
    }

    /// Drop discrete rate bits outside `[rate_min, rate_max]` and tighten the
    /// bounds to the surviving rates. A continuous/knot mask keeps the bounds
    /// as negotiated.
    pub(crate) fn limit_rates(&mut self) {
        if self.rates & (RATE_CONTINUOUS | RATE_KNOT) != 0 {
            return;
        }
        let mut mask = 0;
        let mut lo = u32::MAX;
        let mut hi = 0;
        for (bit, hz) in KNOWN_RATES {
            if self.rates & bit != 0 && hz >= self.rate_min && hz <= self.rate_max {
                mask |= bit;
                lo = lo.min(hz);
                hi = hi.max(hz);
            }
        }
        self.rates = mask;
        if mask != 0 {
            self.rate_min = lo;
            self.rate_max = hi;
        }
    }
}

/// Merge the descriptors of the two endpoints of a stream.
///
/// Rate masks are intersected, but a side advertising continuous or knot
/// rates gets the other side's concrete mask OR'd back in afterwards, so its
/// flexibility does not suppress rates the other side explicitly supports.
pub fn negotiate(dai: &StreamCaps, codec: &StreamCaps) -> NegotiatedConfig {
    let mut rates = dai.rates & codec.rates;
    if codec.rates & (RATE_CONTINUOUS | RATE_KNOT) != 0 {
        rates |= dai.rates;
    }
    if dai.rates & (RATE_CONTINUOUS | RATE_KNOT) != 0 {
        rates |= codec.rates;
    }

    let mut cfg = NegotiatedConfig {
        rate_min: dai.rate_min.max(codec.rate_min),
        rate_max: dai.rate_max.min(codec.rate_max),
        rates,
        channels_min: dai.channels_min.max(codec.channels_min),
        channels_max: dai.channels_max.min(codec.channels_max),
        formats: dai.formats & codec.formats,
    };
    cfg.limit_rates();
    cfg
}
