//! Common test helpers for ALICE-SRT integration tests
//!
//! Author: Moroya Sakamoto

#![allow(dead_code)]

use alice_srt::prelude::*;

// ============================================================================
// Standard test programs
// ============================================================================

/// `[Start, Sphere(0,0,5 r=1), RegisterHit(white), End]`
pub fn single_sphere() -> Program {
    Program::from_instructions(&[
        Instruction::start(),
        Instruction::sphere(CsgOp::Add, Vec3::new(0.0, 0.0, 5.0), 1.0),
        Instruction::register_hit(Material::WHITE),
        Instruction::end(),
    ])
    .unwrap()
}

/// Sphere with its front cut away by a second sphere
pub fn clipped_sphere() -> Program {
    Program::from_instructions(&[
        Instruction::start(),
        Instruction::sphere(CsgOp::Add, Vec3::new(0.0, 0.0, 5.0), 1.0),
        Instruction::sphere(CsgOp::Sub, Vec3::new(0.0, 0.0, 4.0), 0.75),
        Instruction::register_hit(Material::WHITE),
        Instruction::end(),
    ])
    .unwrap()
}

/// Floor, a reflective ball and a box, with a bounding-volume skip
pub fn small_scene() -> Program {
    let mut b = ProgramBuilder::new();
    b.push(Instruction::start());
    b.push(Instruction::plane(CsgOp::Add, Vec3::new(0.0, -1.0, 0.0), -1.0));
    b.push(Instruction::checkerboard(Material::from_rgb(40, 40, 40, 0)));
    b.push(Instruction::register_hit(Material::from_rgb(220, 220, 220, 0)));

    // Bounding box around the ball; skip it when the box is missed
    b.push(Instruction::aabb(CsgOp::Add, Vec3::new(-1.5, -0.5, 3.0), Vec3::new(0.5, 1.5, 5.0)));
    let skip_ball = b.jump_forward(Condition::NoHit, true);
    b.push(Instruction::reset_hit_state());
    b.push(Instruction::sphere(CsgOp::Add, Vec3::new(-0.5, 0.5, 4.0), 0.75));
    b.push(Instruction::register_hit(Material::from_rgb(255, 80, 80, 128)));
    b.bind(skip_ball).unwrap();

    b.push(Instruction::origin(Vec3::new(1.5, 0.0, 6.0)));
    b.push(Instruction::aabb(CsgOp::Add, Vec3::new(-0.5, 0.0, -0.5), Vec3::new(0.5, 1.0, 0.5)));
    b.push(Instruction::register_hit(Material::from_rgb(80, 200, 80, 0)));
    b.push(Instruction::end());
    b.build().unwrap()
}

// ============================================================================
// Rays
// ============================================================================

/// Unit 16-bit direction along +z
pub fn forward() -> I16Vec3 {
    I16Vec3::new(0, 0, FIXED_ONE as i16)
}

/// Ray from the origin along +z
pub fn forward_ray() -> Ray {
    Ray::new(IVec3::ZERO, forward())
}

// ============================================================================
// Assertions
// ============================================================================

/// Assert two 18.14 values differ by at most `tolerance` (in float units)
pub fn assert_close(actual: i32, expected: f32, tolerance: f32) {
    let a = from_fixed(actual);
    assert!(
        (a - expected).abs() <= tolerance,
        "expected {expected} ± {tolerance}, got {a}"
    );
}

/// Run the same ray through both backends and assert the hits agree
pub fn assert_backends_agree(program: &Program, ray: &Ray, kind: RayKind) -> (RayOutcome, RayOutcome) {
    let engine = Engine::with_config(EngineConfig::fast_fail())
        .run(program, ray, kind)
        .unwrap();
    let emulator = Emulator::new().run(program, ray, kind).unwrap();
    assert_eq!(engine.hit, emulator.hit, "backends disagree for {kind:?} ray {ray:?}");
    (engine, emulator)
}
