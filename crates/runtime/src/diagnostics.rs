//! SIGQUIT diagnostics (Unix only): dump interpreter statistics to
//! stderr without stopping the process. Useful when a long-running
//! script looks stuck.
//!
//! A dedicated thread waits on the signal and takes the interpreter
//! lock only long enough to snapshot the counters, so the dump is
//! consistent but never races running script code.

#[cfg(unix)]
pub fn install() {
    use signal_hook::consts::SIGQUIT;
    use signal_hook::iterator::Signals;

    let mut signals = match Signals::new([SIGQUIT]) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!("could not install SIGQUIT diagnostics: {e}");
            return;
        }
    };
    std::thread::spawn(move || {
        for _ in signals.forever() {
            let ip = marl_core::interp::enter();
            let report = crate::report::gather(ip);
            marl_core::interp::leave();
            eprintln!("{}", crate::report::render(&report, false));
        }
    });
}

#[cfg(not(unix))]
pub fn install() {}
