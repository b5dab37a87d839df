mod reactor;
mod sigpipe;
mod stream;
mod transport;

pub use mio::{Token, Waker};
pub use reactor::{PollEvent, Reactor};
pub use sigpipe::guarded as sigpipe_guarded;
pub use transport::Transport;
