//! The receive pipeline.
//!
//! ```text
//! bytes ─→ decode ─→ wrap ──hit──→ packet listeners
//!                     │
//!                    miss
//!                     ├── combined  ─→ wrap each child (recursively)
//!                     └── primitive ─→ raw-packet listeners
//! ```
//!
//! Everything here is a free function over a [`DispatchContext`], which
//! carries the handful of session pieces dispatch needs. That keeps the
//! pipeline testable without sockets or worker threads.

use std::panic::{catch_unwind, AssertUnwindSafe};

use tclink_protocol::{BinaryCodec, Codec, ConversionRegistry, Packet, ProtocolError};

use crate::listeners::{ListenerSet, PacketListener, RawPacketListener};

/// What dispatch needs from a session.
pub(crate) struct DispatchContext<'a, D> {
    pub(crate) codec: &'a BinaryCodec,
    pub(crate) registry: &'a ConversionRegistry<D>,
    pub(crate) packet_listeners: &'a ListenerSet<PacketListener<D>>,
    pub(crate) raw_listeners: &'a ListenerSet<RawPacketListener>,
}

/// How many packets went where during one dispatch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Delivery {
    pub(crate) domain: usize,
    pub(crate) raw: usize,
}

/// Decodes one frame and dispatches it. Returns the decoded packet so
/// callers can hand it on (e.g. to a reply handler).
pub(crate) fn handle_frame<D>(
    ctx: &DispatchContext<'_, D>,
    sender: &str,
    frame: &[u8],
) -> Result<Packet, ProtocolError> {
    let packet = ctx.codec.decode(frame)?;
    let delivery = dispatch(ctx, &packet);
    tracing::trace!(
        %sender,
        kind = %packet.kind(),
        label = packet.label(),
        domain = delivery.domain,
        raw = delivery.raw,
        "frame dispatched"
    );
    Ok(packet)
}

/// Routes `packet` to the listeners.
pub(crate) fn dispatch<D>(ctx: &DispatchContext<'_, D>, packet: &Packet) -> Delivery {
    let mut delivery = Delivery::default();
    dispatch_into(ctx, packet, &mut delivery);
    delivery
}

fn dispatch_into<D>(ctx: &DispatchContext<'_, D>, packet: &Packet, delivery: &mut Delivery) {
    if let Some(domain) = ctx.registry.wrap(packet) {
        notify(ctx.packet_listeners, |listener| listener(&domain));
        delivery.domain += 1;
    } else if packet.is_combined() {
        for child in packet.children() {
            dispatch_into(ctx, child, delivery);
        }
    } else {
        notify(ctx.raw_listeners, |listener| listener(packet));
        delivery.raw += 1;
    }
}

/// Calls every listener in `set`, containing panics.
fn notify<L: ?Sized>(set: &ListenerSet<L>, call: impl Fn(&L)) {
    for listener in set.snapshot() {
        if catch_unwind(AssertUnwindSafe(|| call(&*listener))).is_err() {
            tracing::warn!("listener panicked; continuing with the next one");
        }
    }
}
