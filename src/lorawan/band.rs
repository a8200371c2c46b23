//! Regional channel plans.
//!
//! A [`Band`] holds the uplink channel table of one regulatory region plus the
//! extra channels the network server is configured to hand out in the
//! join-accept CFList. Channel indices are positions in that table: the
//! region's default channels come first, configured extras follow.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of frequency slots in a channel-type CFList.
pub const CF_LIST_SLOTS: usize = 5;

/// Errors from band setup and channel lookups.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BandError {
    /// Band name not supported.
    #[error("unknown band '{0}' (expected one of EU868, RU864, IN865, US915)")]
    UnknownBand(String),

    /// No channel in the table uses this frequency.
    #[error("no uplink channel with frequency {0} Hz")]
    UnknownFrequency(u32),

    /// Channel index beyond the table.
    #[error("uplink channel index {0} out of range")]
    InvalidChannel(u32),
}

/// Supported regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BandName {
    /// Europe 863-870 MHz
    Eu868,
    /// Russia 864-870 MHz
    Ru864,
    /// India 865-867 MHz
    In865,
    /// United States 902-928 MHz
    Us915,
}

impl BandName {
    /// Canonical upper-case name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eu868 => "EU868",
            Self::Ru864 => "RU864",
            Self::In865 => "IN865",
            Self::Us915 => "US915",
        }
    }
}

impl fmt::Display for BandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BandName {
    type Err = BandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('_', "").as_str() {
            "EU868" => Ok(Self::Eu868),
            "RU864" => Ok(Self::Ru864),
            "IN865" => Ok(Self::In865),
            "US915" => Ok(Self::Us915),
            _ => Err(BandError::UnknownBand(s.to_string())),
        }
    }
}

/// An uplink channel: centre frequency and allowed data-rate span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Channel {
    /// Centre frequency in Hz.
    pub frequency: u32,
    /// Lowest data rate index.
    pub min_dr: u8,
    /// Highest data rate index.
    pub max_dr: u8,
}

/// Region defaults used when rebuilding a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandDefaults {
    /// RX2 frequency in Hz.
    pub rx2_frequency: u32,
    /// RX2 data rate.
    pub rx2_dr: u8,
    /// RX1 delay in seconds.
    pub receive_delay1: u8,
}

#[derive(Debug, Clone, Copy)]
struct UplinkChannel {
    channel: Channel,
    custom: bool,
}

/// Uplink channel table of one region.
#[derive(Debug, Clone)]
pub struct Band {
    name: BandName,
    uplink_channels: Vec<UplinkChannel>,
    cf_list_frequencies: Vec<u32>,
    defaults: BandDefaults,
    min_frequency: u32,
    max_frequency: u32,
}

impl Band {
    /// Build the table for `name` with no extra channels.
    #[must_use]
    pub fn new(name: BandName) -> Self {
        let (channels, defaults, min_frequency, max_frequency) = match name {
            BandName::Eu868 => (
                vec![
                    ch(868_100_000, 0, 5),
                    ch(868_300_000, 0, 5),
                    ch(868_500_000, 0, 5),
                ],
                defaults(869_525_000, 0),
                863_000_000,
                870_000_000,
            ),
            BandName::Ru864 => (
                vec![ch(868_900_000, 0, 5), ch(869_100_000, 0, 5)],
                defaults(869_100_000, 0),
                864_000_000,
                870_000_000,
            ),
            BandName::In865 => (
                vec![
                    ch(865_062_500, 0, 5),
                    ch(865_402_500, 0, 5),
                    ch(865_985_000, 0, 5),
                ],
                defaults(866_550_000, 2),
                865_000_000,
                867_000_000,
            ),
            BandName::Us915 => {
                let mut channels: Vec<Channel> = (0..64u32)
                    .map(|i| ch(902_300_000 + i * 200_000, 0, 3))
                    .collect();
                channels.extend((0..8u32).map(|i| ch(903_000_000 + i * 1_600_000, 4, 4)));
                (channels, defaults(923_300_000, 8), 902_000_000, 928_000_000)
            }
        };

        Self {
            name,
            uplink_channels: channels
                .into_iter()
                .map(|channel| UplinkChannel {
                    channel,
                    custom: false,
                })
                .collect(),
            cf_list_frequencies: Vec::new(),
            defaults,
            min_frequency,
            max_frequency,
        }
    }

    /// Build the table and register configured extra channels.
    ///
    /// Extras within the band's frequency range join the channel table. Every
    /// nonzero extra is announced in the CFList, up to [`CF_LIST_SLOTS`].
    /// Fixed-plan regions ignore extras.
    #[must_use]
    pub fn with_extra_channels(name: BandName, extras: &[Channel]) -> Self {
        let mut band = Self::new(name);
        if !band.supports_cf_list() {
            if !extras.is_empty() {
                log::warn!(
                    "{} uses a fixed channel plan, ignoring {} extra channel(s)",
                    name,
                    extras.len()
                );
            }
            return band;
        }

        for extra in extras.iter().filter(|c| c.frequency != 0) {
            if (band.min_frequency..=band.max_frequency).contains(&extra.frequency) {
                band.uplink_channels.push(UplinkChannel {
                    channel: *extra,
                    custom: true,
                });
            } else {
                log::warn!(
                    "extra channel {} Hz is outside {} ({}-{} Hz)",
                    extra.frequency,
                    name,
                    band.min_frequency,
                    band.max_frequency
                );
            }
            if band.cf_list_frequencies.len() < CF_LIST_SLOTS {
                band.cf_list_frequencies.push(extra.frequency);
            }
        }
        band
    }

    /// Region of this table.
    #[must_use]
    pub fn name(&self) -> BandName {
        self.name
    }

    /// Lower-case region name, the default channel-plan identifier.
    #[must_use]
    pub fn plan_id(&self) -> String {
        self.name.as_str().to_ascii_lowercase()
    }

    /// Region defaults.
    #[must_use]
    pub fn defaults(&self) -> BandDefaults {
        self.defaults
    }

    /// Whether the region carries channel frequencies in the join-accept CFList.
    #[must_use]
    pub fn supports_cf_list(&self) -> bool {
        !matches!(self.name, BandName::Us915)
    }

    /// Indices of the region's default (non-custom) uplink channels.
    #[must_use]
    pub fn standard_uplink_channel_indices(&self) -> Vec<u32> {
        self.uplink_channels
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.custom)
            .map(|(i, _)| i as u32)
            .collect()
    }

    /// Resolve a frequency to a channel index.
    ///
    /// `default_channel` selects between the region's default channels and
    /// configured extras.
    pub fn uplink_channel_index(&self, frequency: u32, default_channel: bool) -> Result<u32, BandError> {
        self.uplink_channels
            .iter()
            .position(|c| c.channel.frequency == frequency && c.custom != default_channel)
            .map(|i| i as u32)
            .ok_or(BandError::UnknownFrequency(frequency))
    }

    /// Channel at `index`.
    pub fn uplink_channel(&self, index: u32) -> Result<Channel, BandError> {
        self.uplink_channels
            .get(index as usize)
            .map(|c| c.channel)
            .ok_or(BandError::InvalidChannel(index))
    }

    /// The five CFList frequency slots, zero padded.
    ///
    /// `None` for fixed-plan regions and when no extras are configured.
    #[must_use]
    pub fn cf_list(&self) -> Option<[u32; CF_LIST_SLOTS]> {
        if !self.supports_cf_list() || self.cf_list_frequencies.is_empty() {
            return None;
        }
        let mut slots = [0u32; CF_LIST_SLOTS];
        for (slot, freq) in slots.iter_mut().zip(&self.cf_list_frequencies) {
            *slot = *freq;
        }
        Some(slots)
    }
}

fn ch(frequency: u32, min_dr: u8, max_dr: u8) -> Channel {
    Channel {
        frequency,
        min_dr,
        max_dr,
    }
}

fn defaults(rx2_frequency: u32, rx2_dr: u8) -> BandDefaults {
    BandDefaults {
        rx2_frequency,
        rx2_dr,
        receive_delay1: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_name_parse() {
        assert_eq!("ru864".parse::<BandName>().unwrap(), BandName::Ru864);
        assert_eq!("EU_868".parse::<BandName>().unwrap(), BandName::Eu868);
        assert!(matches!(
            "XX123".parse::<BandName>(),
            Err(BandError::UnknownBand(_))
        ));
    }

    #[test]
    fn test_standard_indices_eu868() {
        let band = Band::new(BandName::Eu868);
        assert_eq!(band.standard_uplink_channel_indices(), vec![0, 1, 2]);
        assert_eq!(band.defaults().rx2_frequency, 869_525_000);
        assert_eq!(band.plan_id(), "eu868");
    }

    #[test]
    fn test_us915_has_72_channels_and_no_cflist() {
        let band = Band::with_extra_channels(BandName::Us915, &[ch(904_000_000, 0, 3)]);
        assert_eq!(band.standard_uplink_channel_indices().len(), 72);
        assert_eq!(band.uplink_channel(64).unwrap().frequency, 903_000_000);
        assert!(band.cf_list().is_none());
    }

    #[test]
    fn test_extra_channels_resolve() {
        let band = Band::with_extra_channels(
            BandName::Ru864,
            &[ch(864_100_000, 0, 5), ch(864_300_000, 0, 5)],
        );
        assert_eq!(
            band.cf_list().unwrap(),
            [864_100_000, 864_300_000, 0, 0, 0]
        );
        assert_eq!(band.uplink_channel_index(864_100_000, false).unwrap(), 2);
        assert_eq!(band.uplink_channel_index(864_300_000, false).unwrap(), 3);
        assert_eq!(band.uplink_channel(3).unwrap(), ch(864_300_000, 0, 5));
        assert_eq!(band.standard_uplink_channel_indices(), vec![0, 1]);
    }

    #[test]
    fn test_default_channel_not_matched_as_custom() {
        let band = Band::new(BandName::Ru864);
        assert_eq!(band.uplink_channel_index(868_900_000, true).unwrap(), 0);
        assert_eq!(
            band.uplink_channel_index(868_900_000, false),
            Err(BandError::UnknownFrequency(868_900_000))
        );
    }

    #[test]
    fn test_out_of_range_extra_in_cflist_but_unresolvable() {
        let band = Band::with_extra_channels(BandName::Ru864, &[ch(433_175_000, 0, 5)]);
        assert_eq!(band.cf_list().unwrap()[0], 433_175_000);
        assert!(band.uplink_channel_index(433_175_000, false).is_err());
    }

    #[test]
    fn test_cflist_caps_at_five() {
        let extras: Vec<Channel> = (0..7u32).map(|i| ch(864_100_000 + i * 200_000, 0, 5)).collect();
        let band = Band::with_extra_channels(BandName::Ru864, &extras);
        let list = band.cf_list().unwrap();
        assert_eq!(list[4], 864_900_000);
    }

    #[test]
    fn test_invalid_channel_index() {
        let band = Band::new(BandName::Eu868);
        assert_eq!(band.uplink_channel(9), Err(BandError::InvalidChannel(9)));
    }
}
