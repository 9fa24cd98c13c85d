//! Discrete-time tick driver.
//!
//! The clock is the time source for a simulation: `start` resets it and
//! reinitializes members, `tick` advances it by one step. Members are
//! invoked exactly once per tick, synchronously, in the order the caller
//! drives them.

use crate::traits::{Ports, TickInfo, Tickable};

#[derive(Debug, Clone, Copy)]
pub struct Clock {
    time: f64,
    dt: f64,
}

impl Clock {
    pub fn new(dt: f64) -> Self {
        Self { time: 0.0, dt }
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn info(&self) -> TickInfo {
        TickInfo {
            time: self.time,
            dt: self.dt,
        }
    }

    /// Reset to time zero. The returned info is what members should be
    /// reinitialized with.
    pub fn start(&mut self) -> TickInfo {
        self.time = 0.0;
        self.info()
    }

    /// Advance one step and return the new tick's info.
    pub fn tick(&mut self) -> TickInfo {
        self.time += self.dt;
        self.info()
    }

    /// Convenience driver for a single member: reinit at time zero, then
    /// run `steps` process ticks.
    pub fn run(
        &mut self,
        steps: usize,
        member: &mut dyn Tickable,
        ports: &mut dyn Ports,
    ) {
        let info = self.start();
        member.reinit(&info, ports);
        for _ in 0..steps {
            let info = self.tick();
            member.process(&info, ports);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::NullPorts;

    #[derive(Default)]
    struct Counter {
        reinits: usize,
        processes: usize,
        times: Vec<f64>,
    }

    impl Tickable for Counter {
        fn reinit(&mut self, info: &TickInfo, _ports: &mut dyn Ports) {
            self.reinits += 1;
            self.times.push(info.time);
        }
        fn process(&mut self, info: &TickInfo, _ports: &mut dyn Ports) {
            self.processes += 1;
            self.times.push(info.time);
        }
    }

    #[test]
    fn tick_advances_time_by_dt() {
        let mut clock = Clock::new(0.25);
        assert_eq!(clock.start().time, 0.0);
        assert_eq!(clock.tick().time, 0.25);
        assert_eq!(clock.tick().time, 0.5);
        assert_eq!(clock.info().dt, 0.25);
    }

    #[test]
    fn run_reinits_then_processes() {
        let mut clock = Clock::new(0.5);
        let mut member = Counter::default();
        let mut ports = NullPorts;

        clock.run(3, &mut member, &mut ports);
        assert_eq!(member.reinits, 1);
        assert_eq!(member.processes, 3);
        assert_eq!(member.times, vec![0.0, 0.5, 1.0, 1.5]);
    }

    #[test]
    fn start_resets_after_a_run() {
        let mut clock = Clock::new(1.0);
        clock.tick();
        clock.tick();
        assert_eq!(clock.time(), 2.0);
        assert_eq!(clock.start().time, 0.0);
    }
}
