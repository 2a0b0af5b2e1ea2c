//! Mapping generic packets to domain packets.
//!
//! A protocol family (e.g. the robot packets) gives meaning to packets by
//! their `(kind, label)` pair: a `Double` with label 3 is "motor power", a
//! `Boolean` with label 0 is "PWM enable". The [`ConversionRegistry`] holds
//! those mappings.
//!
//! ```text
//!             ┌──── Byte ─────► [converter, converter, ...]
//! Packet ─────┼──── Double ───► [converter, ...]
//!   (kind)    ├──── ...
//!             └──── Combined ─► [converter, ...]
//! ```
//!
//! Each converter is gated on its label; a mismatch means "not mine", never
//! an error. The first converter (in registration order) that accepts the
//! packet wins.

use std::fmt;

use crate::{Packet, PacketKind, ProtocolError};

/// Anything that can be expressed as a primitive [`Packet`].
pub trait ToPacket {
    /// Materializes the equivalent packet.
    ///
    /// # Errors
    /// Returns a [`ProtocolError`] if the value cannot be represented on
    /// the wire.
    fn to_packet(&self) -> Result<Packet, ProtocolError>;
}

impl ToPacket for Packet {
    fn to_packet(&self) -> Result<Packet, ProtocolError> {
        Ok(self.clone())
    }
}

/// A domain message owning one `(kind, label)` pair.
///
/// Implementors are plain structs; they do not wrap a [`Packet`], they
/// convert to and from one.
pub trait DomainPacket: ToPacket + Sized {
    /// The primitive kind this packet is carried as.
    const KIND: PacketKind;
    /// The label distinguishing this packet within its kind.
    const LABEL: i8;

    /// Attempts to build the domain packet. `None` if the packet does not
    /// have the expected shape.
    fn from_packet(packet: &Packet) -> Option<Self>;

    /// Whether `packet` carries this type's `(kind, label)` pair.
    fn accepts(packet: &Packet) -> bool {
        packet.kind() == Self::KIND && packet.label() == Self::LABEL
    }
}

// ---------------------------------------------------------------------------
// ConversionRegistry
// ---------------------------------------------------------------------------

type ConvertFn<D> = Box<dyn Fn(&Packet) -> Option<D> + Send + Sync>;

struct Converter<D> {
    label: i8,
    convert: ConvertFn<D>,
}

/// Per-kind, label-gated converters producing domain values of type `D`.
///
/// Built once with the `with_*` methods, then shared immutably (usually
/// behind an `Arc`).
///
/// ```rust
/// use tclink_protocol::{ConversionRegistry, Packet, PacketKind};
///
/// let registry = ConversionRegistry::new()
///     .with_converter(PacketKind::Boolean, 0, |p: &Packet| p.as_bool());
///
/// assert_eq!(registry.wrap(&Packet::boolean(1, true).with_label(0)), Some(true));
/// assert_eq!(registry.wrap(&Packet::boolean(1, true).with_label(1)), None);
/// ```
pub struct ConversionRegistry<D> {
    tables: [Vec<Converter<D>>; 8],
}

impl<D> Default for ConversionRegistry<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> ConversionRegistry<D> {
    /// Creates an empty registry. Every packet is a miss.
    pub fn new() -> Self {
        Self {
            tables: std::array::from_fn(|_| Vec::new()),
        }
    }

    /// Registers a converter for `(kind, label)`.
    ///
    /// `convert` only ever sees packets of `kind` carrying `label`.
    #[must_use]
    pub fn with_converter<F>(mut self, kind: PacketKind, label: i8, convert: F) -> Self
    where
        F: Fn(&Packet) -> Option<D> + Send + Sync + 'static,
    {
        self.tables[kind.index()].push(Converter {
            label,
            convert: Box::new(convert),
        });
        self
    }

    /// Registers a [`DomainPacket`] type, lifting it into `D` with `into`.
    #[must_use]
    pub fn with_packet<P, F>(self, into: F) -> Self
    where
        P: DomainPacket + 'static,
        F: Fn(P) -> D + Send + Sync + 'static,
    {
        self.with_converter(P::KIND, P::LABEL, move |packet| {
            P::from_packet(packet).map(&into)
        })
    }

    /// Converts `packet` with the first matching converter of its kind.
    ///
    /// Returns `None` on a miss. A miss on a combined packet is where the
    /// caller typically retries on each child.
    pub fn wrap(&self, packet: &Packet) -> Option<D> {
        self.tables[packet.kind().index()]
            .iter()
            .filter(|converter| converter.label == packet.label())
            .find_map(|converter| (converter.convert)(packet))
    }

    /// Per-kind union of two registries.
    ///
    /// `other`'s converters are appended after `self`'s, so on a duplicate
    /// `(kind, label)` the converter from `self` keeps winning. Use
    /// [`conflicts`](Self::conflicts) to spot such duplicates.
    #[must_use]
    pub fn merge(mut self, other: Self) -> Self {
        for (mine, theirs) in self.tables.iter_mut().zip(other.tables) {
            mine.extend(theirs);
        }
        self
    }

    /// `(kind, label)` pairs registered more than once, in kind order.
    pub fn conflicts(&self) -> Vec<(PacketKind, i8)> {
        let mut found = Vec::new();
        for kind in PacketKind::ALL {
            let table = &self.tables[kind.index()];
            for (i, converter) in table.iter().enumerate() {
                let seen_before =
                    table[..i].iter().any(|c| c.label == converter.label);
                if seen_before && !found.contains(&(kind, converter.label)) {
                    found.push((kind, converter.label));
                }
            }
        }
        found
    }

    /// Number of converters registered for `kind`.
    pub fn converter_count(&self, kind: PacketKind) -> usize {
        self.tables[kind.index()].len()
    }

    /// Total number of converters.
    pub fn len(&self) -> usize {
        self.tables.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<D> fmt::Debug for ConversionRegistry<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for kind in PacketKind::ALL {
            let labels: Vec<i8> =
                self.tables[kind.index()].iter().map(|c| c.label).collect();
            if !labels.is_empty() {
                map.entry(&kind, &labels);
            }
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Enable(bool);

    impl ToPacket for Enable {
        fn to_packet(&self) -> Result<Packet, ProtocolError> {
            Ok(Packet::boolean(0, self.0).with_label(Self::LABEL))
        }
    }

    impl DomainPacket for Enable {
        const KIND: PacketKind = PacketKind::Boolean;
        const LABEL: i8 = 0;

        fn from_packet(packet: &Packet) -> Option<Self> {
            packet.as_bool().map(Enable)
        }
    }

    #[derive(Debug, PartialEq)]
    enum Domain {
        Enable(bool),
        Power(f64),
        Other(&'static str),
    }

    fn registry() -> ConversionRegistry<Domain> {
        ConversionRegistry::new()
            .with_packet(|p: Enable| Domain::Enable(p.0))
            .with_converter(PacketKind::Double, 3, |p| p.as_double().map(Domain::Power))
    }

    #[test]
    fn test_wrap_matching_label_converts() {
        let packet = Packet::boolean(1, true).with_label(0);
        assert_eq!(registry().wrap(&packet), Some(Domain::Enable(true)));
    }

    #[test]
    fn test_wrap_other_label_is_miss() {
        let packet = Packet::boolean(1, true).with_label(1);
        assert_eq!(registry().wrap(&packet), None);
    }

    #[test]
    fn test_wrap_unregistered_kind_is_miss() {
        assert_eq!(registry().wrap(&Packet::int(1, 3).with_label(3)), None);
    }

    #[test]
    fn test_wrap_first_registered_wins() {
        let registry = ConversionRegistry::new()
            .with_converter(PacketKind::Byte, 1, |_| Some(Domain::Other("first")))
            .with_converter(PacketKind::Byte, 1, |_| Some(Domain::Other("second")));
        let packet = Packet::byte(0, 0).with_label(1);
        assert_eq!(registry.wrap(&packet), Some(Domain::Other("first")));
    }

    #[test]
    fn test_wrap_falls_through_rejecting_converter() {
        let registry = ConversionRegistry::new()
            .with_converter(PacketKind::Byte, 1, |_| None)
            .with_converter(PacketKind::Byte, 1, |_| Some(Domain::Other("second")));
        let packet = Packet::byte(0, 0).with_label(1);
        assert_eq!(registry.wrap(&packet), Some(Domain::Other("second")));
    }

    #[test]
    fn test_merge_keeps_first_registry_priority() {
        let a = ConversionRegistry::new()
            .with_converter(PacketKind::Byte, 1, |_| Some(Domain::Other("a")));
        let b = ConversionRegistry::new()
            .with_converter(PacketKind::Byte, 1, |_| Some(Domain::Other("b")))
            .with_converter(PacketKind::Byte, 2, |_| Some(Domain::Other("b2")));

        let merged = a.merge(b);
        assert_eq!(merged.converter_count(PacketKind::Byte), 3);
        assert_eq!(
            merged.wrap(&Packet::byte(0, 0).with_label(1)),
            Some(Domain::Other("a"))
        );
        assert_eq!(
            merged.wrap(&Packet::byte(0, 0).with_label(2)),
            Some(Domain::Other("b2"))
        );
        assert_eq!(merged.conflicts(), vec![(PacketKind::Byte, 1)]);
    }

    #[test]
    fn test_conflicts_empty_for_distinct_pairs() {
        assert!(registry().conflicts().is_empty());
        assert_eq!(registry().len(), 2);
    }

    #[test]
    fn test_empty_registry_misses_everything() {
        let registry: ConversionRegistry<Domain> = ConversionRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.wrap(&Packet::boolean(0, true).with_label(0)), None);
    }

    #[test]
    fn test_domain_packet_accepts_checks_kind_and_label() {
        assert!(Enable::accepts(&Packet::boolean(0, false).with_label(0)));
        assert!(!Enable::accepts(&Packet::byte(0, 0).with_label(0)));
        assert!(!Enable::accepts(&Packet::boolean(0, false)));
    }
}
