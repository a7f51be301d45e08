//! Mix-selection channel table.

/// One selectable mix on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channel {
    /// Two-digit, zero-padded id as the device module registers it.
    pub id: &'static str,
    pub label: &'static str,
}

/// The seven mixes, indexed 1-7 by the mix-select byte.
pub const CHANNELS: [Channel; 7] = [
    Channel { id: "01", label: "Channel 1" },
    Channel { id: "02", label: "Channel 2" },
    Channel { id: "03", label: "Channel 3" },
    Channel { id: "04", label: "Channel 4" },
    Channel { id: "05", label: "Channels 1-2" },
    Channel { id: "06", label: "Channels 3-4" },
    Channel { id: "07", label: "Channels 1-4" },
];

/// Label reported when the mix-select byte matches no channel.
pub const UNKNOWN_CHANNEL: &str = "Unknown";

/// Find the channel for a raw mix-select byte.
pub fn lookup(mix_select: u8) -> Option<&'static Channel> {
    let id = format!("{mix_select:02}");
    CHANNELS.iter().find(|channel| channel.id == id)
}

/// Label for a raw mix-select byte, or [`UNKNOWN_CHANNEL`].
pub fn label(mix_select: u8) -> &'static str {
    lookup(mix_select).map_or(UNKNOWN_CHANNEL, |channel| channel.label)
}
