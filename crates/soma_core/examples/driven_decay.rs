//! A function object driven through a tick loop: an exponential decay with
//! a pushed offset, printing value and rate every few ticks.

use anyhow::Result;
use soma_core::clock::Clock;
use soma_core::function::{Function, Mode};
use soma_core::traits::Ports;

#[derive(Default)]
struct Printer {
    last_value: f64,
    last_rate: f64,
}

impl Ports for Printer {
    fn request_values(&mut self) -> Vec<f64> {
        Vec::new()
    }
    fn value_out(&mut self, value: f64) {
        self.last_value = value;
    }
    fn derivative_out(&mut self, _value: f64) {}
    fn rate_out(&mut self, value: f64) {
        self.last_rate = value;
    }
}

fn main() -> Result<()> {
    let mut func = Function::new();
    func.set_constant("amp", 5.0);
    func.set_constant("tau", 2.0);
    func.set_mode(Mode::All);
    func.set_do_eval_at_reinit(true);
    func.set_expr("amp * exp(-t / tau) + x0")?;
    func.set_input(0, 0.5);

    let mut clock = Clock::new(0.1);
    let mut ports = Printer::default();

    let info = clock.start();
    func.reinit(&info, &mut ports);
    println!("t={:5.2}  value={:8.4}", info.time, ports.last_value);

    for step in 1..=50 {
        let info = clock.tick();
        func.process(&info, &mut ports);
        if step % 10 == 0 {
            println!(
                "t={:5.2}  value={:8.4}  rate={:8.4}",
                info.time, ports.last_value, ports.last_rate
            );
        }
    }

    Ok(())
}
