//! Supervisor scenarios: four simulated belts under one control loop.

use maslow_config::Config;
use maslow_core::supervisor::BeltHardware;
use maslow_core::{BeltState, BeltStatus, Supervisor, SupervisorState};
use maslow_hardware::sim::BeltModel;
use maslow_hardware::{
    simulated_current_sense, simulated_encoder, simulated_host, simulated_mux, simulated_pwm_pin,
    HostHandle,
};
use maslow_traits::HostState;
use rstest::rstest;

struct SimRig {
    sup: Supervisor,
    models: Vec<BeltModel>,
    host: HostHandle,
}

fn sim_rig() -> SimRig {
    let (mux, _) = simulated_mux();
    let (host_machine, host) = simulated_host();

    let mut builder = Supervisor::builder(Config::default_rig())
        .mux(Box::new(mux))
        .host(Box::new(host_machine));
    let mut models = Vec::new();
    for _ in 0..4 {
        let (sensor, enc) = simulated_encoder();
        enc.set_ticks(400);
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
    let mut sup = builder.build().expect("supervisor build");
    sup.init().expect("supervisor init");
    SimRig { sup, models, host }
}

fn step(rig: &mut SimRig, cycles: u32) {
    for _ in 0..cycles {
        for model in &mut rig.models {
            model.step();
        }
        rig.sup.update().expect("supervisor update");
    }
}

fn step_until(rig: &mut SimRig, budget: u32, done: impl Fn(&Supervisor) -> bool) -> u32 {
    for cycle in 0..budget {
        if done(&rig.sup) {
            return cycle;
        }
        step(rig, 1);
    }
    panic!("condition not reached within {budget} cycles");
}

/// Run the built-in belt test to home all four belts.
fn home_all(rig: &mut SimRig) {
    rig.sup.request_test();
    step_until(rig, 1_000, |s| {
        s.state() == SupervisorState::WaitForCommand && (0..4).all(|i| s.belt(i).homed())
    });
}

#[rstest]
fn test_command_homes_all_belts() {
    let mut rig = sim_rig();
    step(&mut rig, 3);

    rig.sup.request_test();
    step_until(&mut rig, 50, |s| s.state() == SupervisorState::Test);
    step_until(&mut rig, 1_000, |s| s.state() == SupervisorState::WaitForCommand);
    for i in 0..4 {
        assert!(rig.sup.belt(i).homed(), "belt {i} not homed");
        assert_eq!(rig.sup.belt(i).position(), 0.0);
        assert_eq!(rig.sup.belt(i).status(), BeltStatus::CompletedSuccess);
    }
}

#[rstest]
fn fan_follows_any_driving_motor() {
    let mut rig = sim_rig();
    step(&mut rig, 3);
    assert!(!rig.sup.fan_requested());

    rig.sup.belt_mut(2).request_retract();
    step_until(&mut rig, 50, |s| s.fan_requested());

    step_until(&mut rig, 500, |s| s.belt(2).homed());
    step(&mut rig, 3);
    assert!(!rig.sup.fan_requested());
}

#[rstest]
fn jog_tracks_the_host_axis() {
    let mut rig = sim_rig();
    step(&mut rig, 3);
    home_all(&mut rig);

    rig.host.set_axis_position(0, 25.0);
    rig.host.set_state(HostState::Jog);
    step_until(&mut rig, 10, |s| s.state() == SupervisorState::Jog);
    step_until(&mut rig, 10, |s| s.belt(0).state() == BeltState::MoveToTarget);

    step(&mut rig, 300);
    assert!(
        (rig.sup.belt(0).position() - 25.0).abs() < 2.0,
        "belt did not track the jog target, position {}",
        rig.sup.belt(0).position()
    );

    // A refresh after jog_refresh_ms re-aims the belt at the new position.
    rig.host.set_axis_position(0, 10.0);
    step(&mut rig, 150); // > 500ms at 5ms per cycle
    step(&mut rig, 300);
    assert!(
        (rig.sup.belt(0).position() - 10.0).abs() < 2.0,
        "belt did not follow the refreshed target, position {}",
        rig.sup.belt(0).position()
    );

    // Leaving jog releases the move and returns to idle.
    rig.host.set_state(HostState::Idle);
    step(&mut rig, 5);
    assert_eq!(rig.sup.state(), SupervisorState::WaitForCommand);
    assert_eq!(rig.sup.belt(0).state(), BeltState::WaitForCommand);
    assert_eq!(rig.sup.belt(0).duty(), 0.0);
}

#[rstest]
fn jog_on_unhomed_belt_does_not_move_it() {
    let mut rig = sim_rig();
    step(&mut rig, 3);

    rig.host.set_axis_position(0, 25.0);
    rig.host.set_state(HostState::Jog);
    step(&mut rig, 20);
    assert_eq!(rig.sup.state(), SupervisorState::Jog);
    // The move is refused cycle after cycle; the belt stays put.
    assert_eq!(rig.sup.belt(0).state(), BeltState::WaitForCommand);
    assert_eq!(rig.sup.belt(0).duty(), 0.0);
}

#[rstest]
fn reset_recovers_a_faulted_belt_without_stopping_the_others() {
    let mut rig = sim_rig();
    step(&mut rig, 3);
    home_all(&mut rig);

    // Wedge belt 1: drive a move while its belt no longer moves.
    rig.sup.belt_mut(1).request_move_to(100.0);
    step_until(&mut rig, 20, |s| s.belt(1).state() == BeltState::MoveToTarget);
    rig.models[1].free_ticks_per_cycle = 0.0;
    step_until(&mut rig, 500, |s| s.belt(1).state() == BeltState::Error);

    // The other belts keep accepting commands.
    rig.sup.belt_mut(0).request_move_to(15.0);
    step(&mut rig, 200);
    assert_eq!(rig.sup.belt(1).state(), BeltState::Error);
    assert!((rig.sup.belt(0).position() - 15.0).abs() < 2.0);
    rig.sup.belt_mut(0).end_move();

    rig.sup.request_reset();
    step(&mut rig, 5);
    assert_eq!(rig.sup.state(), SupervisorState::WaitForCommand);
    for i in 0..4 {
        assert_eq!(rig.sup.belt(i).state(), BeltState::WaitForCommand);
        assert_eq!(rig.sup.belt(i).status(), BeltStatus::Idle);
    }
}

#[rstest]
fn unknown_host_state_halts_the_subsystem() {
    let mut rig = sim_rig();
    step(&mut rig, 3);

    rig.host.set_state(HostState::Unknown);
    step(&mut rig, 2);
    assert_eq!(rig.sup.state(), SupervisorState::FatalError);

    rig.host.set_state(HostState::Idle);
    rig.sup.request_reset();
    step(&mut rig, 10);
    assert_eq!(rig.sup.state(), SupervisorState::FatalError);
}
