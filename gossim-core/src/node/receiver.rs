use super::{NodeIo, PortId};
use crate::element::ElementError;

/// A receiver takes everything that arrived before this tick, there is
/// no backpressure.
pub(super) fn tick(io: &mut NodeIo<'_>) -> Result<(), ElementError> {
    let port = PortId::new(0);
    let generation = io.generation();
    while let Some(pdu) = io.ports.pop(port, generation) {
        io.receive(&pdu, Some(port))?;
    }
    Ok(())
}
