/// Tunables for the order lifecycle and payment ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderConfig {
    /// How many generated order numbers to try before giving up.
    pub order_number_attempts: u32,

    /// How many times a command is decided again after losing an
    /// optimistic concurrency race.
    pub max_command_attempts: u32,
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            order_number_attempts: 10,
            max_command_attempts: 3,
        }
    }
}
