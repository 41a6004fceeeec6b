// SPDX-License-Identifier: Apache-2.0

use std::os::unix::io::AsRawFd;

use tokio::{
    io::{unix::AsyncFd, AsyncBufReadExt, BufReader, Interest},
    time::{interval, Duration, MissedTickBehavior},
};

use crate::{Command, Link, NetError, Stack};

const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Drive `stack` until stdin is closed: frames are processed as soon as the
/// link is readable, timers advance once per second and every stdin line
/// is executed as an operator command.
pub async fn run<L: Link + AsRawFd>(stack: &mut Stack<L>) -> Result<(), NetError> {
    let fd = AsyncFd::with_interest(stack.link().as_raw_fd(), Interest::READABLE)?;
    let mut ticker = interval(TICK_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    stack.start()?;
    loop {
        tokio::select! {
            guard = fd.readable() => {
                let mut guard = guard?;
                if let Err(e) = stack.poll() {
                    log::warn!("Failed to receive frames: {e}");
                }
                guard.clear_ready();
            }
            _ = ticker.tick() => {
                stack.tick();
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    log::info!("Input closed, stopping");
                    return Ok(());
                };
                if line.trim().is_empty() {
                    continue;
                }
                match Command::parse(&line).and_then(|c| c.execute(stack)) {
                    Ok(reply) => print!("{reply}"),
                    Err(e) => println!("{e}"),
                }
            }
        }
        while let Some(event) = stack.pop_event() {
            log::info!("Event {event}");
            println!("{event}");
        }
    }
}
