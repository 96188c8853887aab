//! Gain stages and their device-unit encodings.
//!
//! The receiver exposes three independent stages:
//!
//! | Stage        | Range (dB)        | Step  | Wire value                    |
//! |--------------|-------------------|-------|-------------------------------|
//! | `RF`         | -63.75 ..= 0.0    | 0.25  | `4 * (dB + 63.75)`, 0..=255   |
//! | `PRE-AMP`    | 0 or 14           | 14    | fixed on/off frame            |
//! | `ATTENUATOR` | -30 ..= 0         | 10    | `abs(dB)` as one BCD byte     |
//!
//! [`distribute_gain`] splits a single scalar gain across the three stages.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Lowest RF gain, in dB.
pub const RF_GAIN_MIN: f64 = -63.75;

/// Highest RF gain, in dB.
pub const RF_GAIN_MAX: f64 = 0.0;

/// RF gain resolution, in dB.
pub const RF_GAIN_STEP: f64 = 0.25;

/// Largest RF gain device unit.
pub const RF_GAIN_MAX_UNITS: u16 = 255;

/// Gain added by the pre-amp when enabled, in dB.
pub const PREAMP_GAIN: f64 = 14.0;

/// Combined range of all three stages.
pub const TOTAL_GAIN_RANGE: GainRange = GainRange {
    min: RF_GAIN_MIN + Attenuator::Db30.db(),
    max: RF_GAIN_MAX + PREAMP_GAIN,
    step: 0.0,
};

/// RF gain in 0.25 dB device units.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct RfGain {
    units: u16,
}

impl RfGain {
    /// Encode a gain in dB, rounding to the nearest 0.25 dB step.
    pub fn from_db(db: f64) -> Result<Self> {
        if !(RF_GAIN_MIN..=RF_GAIN_MAX).contains(&db) {
            return Err(Error::unsupported(format!(
                "RF gain {} dB outside [{}, {}]",
                db, RF_GAIN_MIN, RF_GAIN_MAX
            )));
        }
        let units = ((db - RF_GAIN_MIN) / RF_GAIN_STEP).round() as u16;
        Ok(RfGain { units })
    }

    /// Wrap a device unit value read back from the receiver.
    pub fn from_units(units: u32) -> Result<Self> {
        if units > RF_GAIN_MAX_UNITS as u32 {
            return Err(Error::unexpected(format!(
                "RF gain units {} outside 0..={}",
                units, RF_GAIN_MAX_UNITS
            )));
        }
        Ok(RfGain {
            units: units as u16,
        })
    }

    pub fn units(&self) -> u16 {
        self.units
    }

    pub fn db(&self) -> f64 {
        self.units as f64 * RF_GAIN_STEP + RF_GAIN_MIN
    }
}

/// Step attenuator setting.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Attenuator {
    #[default]
    Off,
    Db10,
    Db20,
    Db30,
}

impl Attenuator {
    /// Steps from weakest to strongest.
    pub const ALL: [Attenuator; 4] = [
        Attenuator::Off,
        Attenuator::Db10,
        Attenuator::Db20,
        Attenuator::Db30,
    ];

    /// Accepts exactly 0, -10, -20 or -30 dB.
    pub fn from_db(db: f64) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|a| a.db() == db)
            .ok_or_else(|| {
                Error::unsupported(format!(
                    "attenuator {} dB (supported: 0, -10, -20, -30)",
                    db
                ))
            })
    }

    /// Decode the positive magnitude reported by the receiver.
    pub fn from_units(units: u32) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|a| a.units() as u32 == units)
            .ok_or_else(|| Error::unexpected(format!("attenuator value {}", units)))
    }

    /// Attenuation magnitude sent on the wire (0, 10, 20 or 30).
    pub const fn units(&self) -> u8 {
        match self {
            Attenuator::Off => 0,
            Attenuator::Db10 => 10,
            Attenuator::Db20 => 20,
            Attenuator::Db30 => 30,
        }
    }

    /// Gain contribution, always zero or negative.
    pub const fn db(&self) -> f64 {
        -(self.units() as f64)
    }
}

/// Gain contribution of the pre-amp.
pub fn preamp_db(on: bool) -> f64 {
    if on { PREAMP_GAIN } else { 0.0 }
}

/// Decode the pre-amp state byte of a read-back.
pub fn preamp_from_units(units: u32) -> Result<bool> {
    match units {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(Error::unexpected(format!("pre-amp state {}", other))),
    }
}

/// Named gain stage.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum GainStage {
    Rf,
    PreAmp,
    Attenuator,
}

impl GainStage {
    /// In the order the receiver lists them.
    pub const ALL: [GainStage; 3] = [GainStage::Rf, GainStage::PreAmp, GainStage::Attenuator];

    pub fn name(&self) -> &'static str {
        match self {
            GainStage::Rf => "RF",
            GainStage::PreAmp => "PRE-AMP",
            GainStage::Attenuator => "ATTENUATOR",
        }
    }

    pub fn range(&self) -> GainRange {
        match self {
            GainStage::Rf => GainRange {
                min: RF_GAIN_MIN,
                max: RF_GAIN_MAX,
                step: RF_GAIN_STEP,
            },
            GainStage::PreAmp => GainRange {
                min: 0.0,
                max: PREAMP_GAIN,
                step: PREAMP_GAIN,
            },
            GainStage::Attenuator => GainRange {
                min: Attenuator::Db30.db(),
                max: 0.0,
                step: 10.0,
            },
        }
    }
}

impl fmt::Display for GainStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GainStage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::unsupported(format!("gain stage {:?}", s)))
    }
}

/// Closed range of a gain stage, in dB. `step == 0` means continuous.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GainRange {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl GainRange {
    pub fn contains(&self, db: f64) -> bool {
        (self.min..=self.max).contains(&db)
    }
}

/// Cached setting of all three stages.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GainState {
    pub rf: RfGain,
    pub preamp: bool,
    pub attenuator: Attenuator,
}

impl GainState {
    pub fn total_db(&self) -> f64 {
        self.rf.db() + preamp_db(self.preamp) + self.attenuator.db()
    }

    pub fn stage_db(&self, stage: GainStage) -> f64 {
        match stage {
            GainStage::Rf => self.rf.db(),
            GainStage::PreAmp => preamp_db(self.preamp),
            GainStage::Attenuator => self.attenuator.db(),
        }
    }
}

impl Default for GainState {
    fn default() -> Self {
        GainState {
            rf: RfGain {
                units: RF_GAIN_MAX_UNITS,
            },
            preamp: false,
            attenuator: Attenuator::Off,
        }
    }
}

/// Per-stage settings produced by [`distribute_gain`].
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GainDistribution {
    pub preamp: bool,
    pub attenuator: Attenuator,
    pub rf: RfGain,
}

/// Split a total gain across pre-amp, attenuator and RF, in that order.
///
/// Pre-amp is on for any positive request. The attenuator then takes the
/// deepest step whose threshold the remainder reaches (`<= -30`, `<= -20`,
/// `<= -10`). Whatever is left is clamped to the RF range.
pub fn distribute_gain(total_db: f64) -> Result<GainDistribution> {
    if !total_db.is_finite() {
        return Err(Error::unsupported(format!("gain {} dB", total_db)));
    }

    let preamp = total_db > 0.0;
    let mut remaining = total_db - preamp_db(preamp);

    let attenuator = if remaining <= -30.0 {
        Attenuator::Db30
    } else if remaining <= -20.0 {
        Attenuator::Db20
    } else if remaining <= -10.0 {
        Attenuator::Db10
    } else {
        Attenuator::Off
    };
    remaining -= attenuator.db();

    let rf = RfGain::from_db(remaining.clamp(RF_GAIN_MIN, RF_GAIN_MAX))?;

    Ok(GainDistribution {
        preamp,
        attenuator,
        rf,
    })
}
