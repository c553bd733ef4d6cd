//! Instrument type tags carried by tracks.

/// Which instrument a track plays through.
///
/// Tracks only carry the tag; the engine's instrument rack resolves it to
/// a concrete sampler at scheduling time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InstrumentKind {
    /// Pitched sample playback (piano, keys)
    #[default]
    Keys,
    /// Pitched bass sampler
    Bass,
    /// One-shot drum hits keyed by pitch
    Drums,
    /// Pitched synth sampler
    Synth,
}

impl InstrumentKind {
    /// All kinds, in rack order.
    pub const ALL: [InstrumentKind; 4] = [
        InstrumentKind::Keys,
        InstrumentKind::Bass,
        InstrumentKind::Drums,
        InstrumentKind::Synth,
    ];

    /// Short display name.
    pub fn name(self) -> &'static str {
        match self {
            InstrumentKind::Keys => "keys",
            InstrumentKind::Bass => "bass",
            InstrumentKind::Drums => "drums",
            InstrumentKind::Synth => "synth",
        }
    }
}
