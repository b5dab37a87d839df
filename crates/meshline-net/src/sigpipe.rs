//! Suppression of SIGPIPE around writes to sockets whose peer has gone away,
//! ported from the suppress/restore pair the deployment's C predecessor used
//! around `write()`. Never clears a SIGPIPE that was already pending before
//! the write began.

#[cfg(unix)]
mod imp {
    use std::mem::MaybeUninit;

    pub struct Guard {
        already_pending: bool,
        already_blocked: bool,
    }

    fn sigpipe_pending() -> bool {
        unsafe {
            let mut pending = MaybeUninit::<libc::sigset_t>::zeroed().assume_init();
            libc::sigpending(&mut pending);
            libc::sigismember(&pending, libc::SIGPIPE) != 0
        }
    }

    pub fn suppress() -> Guard {
        let already_pending = sigpipe_pending();
        unsafe {
            let mut block = MaybeUninit::<libc::sigset_t>::zeroed().assume_init();
            libc::sigemptyset(&mut block);
            libc::sigaddset(&mut block, libc::SIGPIPE);
            let mut old = MaybeUninit::<libc::sigset_t>::zeroed().assume_init();
            libc::pthread_sigmask(libc::SIG_BLOCK, &block, &mut old);
            Guard { already_pending, already_blocked: libc::sigismember(&old, libc::SIGPIPE) != 0 }
        }
    }

    pub fn restore(guard: Guard) {
        if !guard.already_pending && sigpipe_pending() {
            unsafe {
                let mut wait = MaybeUninit::<libc::sigset_t>::zeroed().assume_init();
                libc::sigemptyset(&mut wait);
                libc::sigaddset(&mut wait, libc::SIGPIPE);
                let zero = libc::timespec { tv_sec: 0, tv_nsec: 0 };
                libc::sigtimedwait(&wait, std::ptr::null_mut(), &zero);
            }
        }
        if !guard.already_blocked {
            unsafe {
                let mut block = MaybeUninit::<libc::sigset_t>::zeroed().assume_init();
                libc::sigemptyset(&mut block);
                libc::sigaddset(&mut block, libc::SIGPIPE);
                libc::pthread_sigmask(libc::SIG_UNBLOCK, &block, std::ptr::null_mut());
            }
        }
    }
}

#[cfg(not(unix))]
mod imp {
    pub struct Guard;

    pub fn suppress() -> Guard {
        Guard
    }

    pub fn restore(_guard: Guard) {}
}

pub use imp::{Guard, restore, suppress};

/// Runs `f` with SIGPIPE suppressed for the duration of the call, restoring
/// whatever pending/blocked state existed beforehand.
pub fn guarded<T>(f: impl FnOnce() -> T) -> T {
    let guard = suppress();
    let result = f();
    restore(guard);
    result
}
