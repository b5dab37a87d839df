/// The unit of communication between a hub and its peers.
///
/// `sender`/`receiver` are logical peer identities; `receiver == 0` means
/// "the hub itself". `id` values below [`crate::control::ABI_FLOOR`] are
/// reserved for control events synthesized by the library.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    pub id: i32,
    pub sender: i8,
    pub receiver: i8,
    pub writeback: bool,
    pub payload: Vec<i32>,
}

impl Event {
    pub fn new(id: i32, sender: i8, receiver: i8, writeback: bool, payload: Vec<i32>) -> Self {
        Self { id, sender, receiver, writeback, payload }
    }

    pub fn length(&self) -> i32 {
        self.payload.len() as i32
    }
}
