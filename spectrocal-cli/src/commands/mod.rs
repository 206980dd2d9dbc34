//! Command implementations.
//!
//! Each subcommand is implemented in its own module for clean separation.

pub(crate) mod collect;
pub(crate) mod completions;
pub(crate) mod ports;
pub(crate) mod query;

use {
    crate::use_fancy_output,
    console::style,
    indicatif::{ProgressBar, ProgressStyle},
    spectrocal::{DeviceInfo, NativePortLister, SessionEvent, Station, StationEvent},
    std::time::Duration,
};

/// Spinner shown while waiting on the instrument.
fn spinner(quiet: bool) -> ProgressBar {
    if quiet || !use_fancy_output() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(template);
    }
    pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Print a line without tearing the spinner.
fn report(pb: &ProgressBar, quiet: bool, message: &str) {
    if !pb.is_hidden() {
        pb.println(message);
    } else if !quiet {
        eprintln!("{message}");
    }
}

/// Run one acquisition with spinner and milestone output on stderr.
pub(crate) fn acquire(
    station: &Station<NativePortLister>,
    quiet: bool,
) -> spectrocal::Result<DeviceInfo> {
    let pb = spinner(quiet);

    let result = station.acquire_with_progress(&mut |event| match event {
        StationEvent::Discovering => pb.set_message("Waiting for UART adapter board..."),
        StationEvent::Opening(port) => pb.set_message(format!("Opening {port}")),
        StationEvent::Session(SessionEvent::PassStarted(1)) => {
            pb.set_message("Interrogating instrument");
        },
        StationEvent::Session(SessionEvent::PassStarted(pass)) => {
            pb.set_message(format!("Interrogating instrument (attempt {pass})"));
        },
        StationEvent::Session(SessionEvent::Resending { command, attempts }) => {
            pb.set_message(format!("Waiting for {command} response ({attempts} sent)"));
        },
        StationEvent::Session(SessionEvent::Serial(serial)) => report(
            &pb,
            quiet,
            &format!("{} Instrument {}", style(">").cyan(), style(serial).bold()),
        ),
        StationEvent::Session(SessionEvent::Firmware(firmware)) => report(
            &pb,
            quiet,
            &format!("{} Instrument firmware {firmware}", style(">").cyan()),
        ),
        StationEvent::Session(SessionEvent::BlackPoint(points)) => report(
            &pb,
            quiet,
            &format!("{} Got black point ({points} values)", style(">").cyan()),
        ),
        StationEvent::Session(SessionEvent::WhitePoint(points)) => report(
            &pb,
            quiet,
            &format!("{} Got white point ({points} values)", style(">").cyan()),
        ),
        StationEvent::Session(SessionEvent::Restarting { delay, .. }) => {
            pb.set_message(format!("Restarting in {} ms", delay.as_millis()));
        },
        StationEvent::Closed(_) => {},
    });

    pb.finish_and_clear();
    result
}
