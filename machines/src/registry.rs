//! Machine registry for automatic front-end discovery.
//!
//! Each front-end-capable machine self-registers via
//! [`inventory::submit!`] with a [`MachineEntry`] naming it and
//! providing a factory from raw ROM bytes. Front ends enumerate the
//! registry at runtime instead of maintaining a central list.

use markiii_core::core::Machine;

/// Describes a front-end-capable machine.
pub struct MachineEntry {
    /// CLI name used to select this machine (e.g., "sms").
    pub name: &'static str,
    /// Human-readable description for display.
    pub description: &'static str,
    /// Factory: construct a machine from a raw ROM image.
    pub create: fn(&[u8]) -> Box<dyn Machine>,
}

impl MachineEntry {
    pub const fn new(
        name: &'static str,
        description: &'static str,
        create: fn(&[u8]) -> Box<dyn Machine>,
    ) -> Self {
        Self { name, description, create }
    }
}

inventory::collect!(MachineEntry);

/// Return all registered machines, sorted by name.
pub fn all() -> Vec<&'static MachineEntry> {
    let mut entries: Vec<_> = inventory::iter::<MachineEntry>.into_iter().collect();
    entries.sort_by_key(|e| e.name);
    entries
}

/// Look up a machine by its CLI name.
pub fn find(name: &str) -> Option<&'static MachineEntry> {
    inventory::iter::<MachineEntry>
        .into_iter()
        .find(|e| e.name == name)
}
