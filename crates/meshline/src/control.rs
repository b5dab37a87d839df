//! Reserved control event ids. Values at or above [`ABI_FLOOR`] are free
//! for application use; values below it are produced and consumed by the
//! library itself and must never be forwarded as ordinary events.

pub const ABI_FLOOR: i32 = 100;

pub const CONFIRMED: i32 = 1;
pub const CONNECTED: i32 = 2;
pub const DISCONNECTED: i32 = 3;
pub const ALIVE: i32 = 4;
pub const ALIVE_CONFIRM: i32 = 5;
pub const USER_OFFLINE: i32 = 6;

pub fn is_control(id: i32) -> bool {
    id < ABI_FLOOR
}
