/// Stamp is a monotonically non-decreasing version counter.
///
/// Both facts (externally stored records) and targets carry stamps. A fact's
/// stamp comes from the fact store and advances whenever the fact is written;
/// a target's own stamp is assigned by the resolver when one of its update
/// passes actually changes something. Staleness is decided purely by comparing
/// stamps with ordinary integer ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Stamp(pub u32);

impl Stamp {
    /// The zero stamp, carried by facts and targets that have never advanced.
    pub const ZERO: Stamp = Stamp(0);

    /// Returns the next stamp value.
    pub fn next(self) -> Stamp {
        Stamp(self.0 + 1)
    }
}

impl std::fmt::Display for Stamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
