//! Simulated rig assembly: four modeled belts, a multiplexer and a host
//! bridge wired into one supervisor.

use maslow_config::Config;
use maslow_core::error::BuildError;
use maslow_core::{BeltHardware, Supervisor};
use maslow_hardware::sim::BeltModel;
use maslow_hardware::{
    simulated_current_sense, simulated_encoder, simulated_host, simulated_mux, simulated_pwm_pin,
    HostHandle,
};

/// Ticks each simulated belt starts from; roughly 21mm of feed-out so a
/// retract has something to do.
const START_TICKS: i32 = 2_000;

pub struct SimRig {
    pub supervisor: Supervisor,
    pub models: Vec<BeltModel>,
    pub host: HostHandle,
}

impl SimRig {
    pub fn build(cfg: Config) -> Result<Self, BuildError> {
        let (mux, _) = simulated_mux();
        let (host_machine, host) = simulated_host();

        let mut builder = Supervisor::builder(cfg)
            .mux(Box::new(mux))
            .host(Box::new(host_machine));
        let mut models = Vec::new();
        for _ in 0..4 {
            let (sensor, enc) = simulated_encoder();
            enc.set_ticks(START_TICKS);
            let (fwd_pin, fwd) = simulated_pwm_pin();
            let (rev_pin, rev) = simulated_pwm_pin();
            let (sense_in, sense) = simulated_current_sense();
            builder = builder.belt(BeltHardware {
                sensor: Box::new(sensor),
                fwd_pin: Box::new(fwd_pin),
                rev_pin: Box::new(rev_pin),
                current_sense: Box::new(sense_in),
            });
            models.push(BeltModel::new(enc, fwd, rev, sense));
        }
        let supervisor = builder.build()?;
        Ok(Self {
            supervisor,
            models,
            host,
        })
    }

    /// One control cycle: advance the plant models, then the supervisor.
    pub fn step(&mut self) -> maslow_core::Result<()> {
        for model in &mut self.models {
            model.step();
        }
        self.supervisor.update()
    }
}
