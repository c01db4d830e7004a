use markiii_core::core::Bus;

/// Minimal bus for testing: flat 64 KiB memory plus a stub I/O space.
pub struct TestBus {
    pub memory: [u8; 0x10000],
    /// Value returned for any `io_read`.
    pub io_value: u8,
    /// Last `io_write`, as (port, data).
    pub last_out: Option<(u16, u8)>,
}

impl TestBus {
    pub fn new() -> Self {
        Self {
            memory: [0; 0x10000],
            io_value: 0xFF,
            last_out: None,
        }
    }

    pub fn load(&mut self, addr: u16, data: &[u8]) {
        let start = addr as usize;
        self.memory[start..start + data.len()].copy_from_slice(data);
    }
}

impl Bus for TestBus {
    fn read(&mut self, addr: u16) -> u8 {
        self.memory[addr as usize]
    }

    fn write(&mut self, addr: u16, data: u8) {
        self.memory[addr as usize] = data;
    }

    fn io_read(&mut self, _port: u16) -> u8 {
        self.io_value
    }

    fn io_write(&mut self, port: u16, data: u8) {
        self.last_out = Some((port, data));
    }
}
