// tests/world_tests.rs — headless end-to-end runs through the public API.

use std::cell::RefCell;
use std::rc::Rc;

use macroquad::prelude::*;
use tilebox::{
    decode_map_str_to_ir, BodyOptions, CameraMode, TileShape, World, WorldConfig,
};

const BORDERED_4X4: &str = r#"
{
  "width": 4, "height": 4,
  "tilewidth": 32, "tileheight": 32,
  "layers": [
    {"type":"tilelayer","name":"Collision","width":4,"height":4,
     "data":[1,1,1,1,
             1,0,0,1,
             1,0,0,1,
             1,1,1,1]}
  ]
}
"#;

fn bordered_world(config: WorldConfig) -> World {
    let mut world = World::new(config);
    let ir = decode_map_str_to_ir(BORDERED_4X4).expect("map decodes");
    world.load_tilemap_ir(&ir).expect("map ingests");
    world
}

#[test]
fn dynamic_sprite_stays_inside_the_bordered_map() {
    let mut world = bordered_world(WorldConfig::default());
    // Tile size 1, auto-centered: the playable interior is (-1,-1)..(1,1).
    world.register_tile_shape(
        9,
        TileShape::Circle {
            cx: 0.5,
            cy: 0.5,
            r: 0.5,
        },
    );
    let idx = world
        .create_sprite("ball", 9, vec2(0.0, 0.5), vec2(0.4, 0.4))
        .unwrap();
    assert!(world.sprite_add_body(idx, BodyOptions::default()));
    world.set_sprite_velocity(idx, vec2(3.0, 0.0));

    for _ in 0..10 {
        world.update(1.0 / 60.0);
    }

    let sprite = world.sprite(idx).expect("sprite alive");
    assert!(sprite.x.abs() < 1.0, "x stayed inside the border walls");
    assert!(sprite.y.abs() < 1.5, "y stayed inside the border walls");
    let body = sprite.body.expect("body attached");
    assert!(world.physics.is_valid(body.handle));
}

#[test]
fn body_sync_overwrites_direct_position_writes() {
    let mut world = bordered_world(WorldConfig {
        gravity: vec2(0.0, 0.0),
        ..Default::default()
    });
    let idx = world
        .create_sprite("crate", 1, vec2(0.0, 0.0), vec2(0.4, 0.4))
        .unwrap();
    world.sprite_add_body(idx, BodyOptions::default());

    // Mutating the visual fields behind the body's back must not stick.
    world.sprite_mut(idx).unwrap().x = 5.0;
    world.update(1.0 / 60.0);
    assert!(world.sprite(idx).unwrap().x.abs() < 0.1);

    // Going through the body-aware setter does stick.
    world.set_sprite_position(idx, vec2(0.5, 0.5));
    world.update(1.0 / 60.0);
    assert!((world.sprite(idx).unwrap().x - 0.5).abs() < 0.1);
}

#[test]
fn collision_callback_reports_sprite_names() {
    let mut world = bordered_world(WorldConfig {
        gravity: vec2(0.0, 0.0),
        ..Default::default()
    });
    let a = world
        .create_sprite("runner", 1, vec2(-0.6, 0.0), vec2(0.3, 0.3))
        .unwrap();
    let b = world
        .create_sprite("target", 1, vec2(0.6, 0.0), vec2(0.3, 0.3))
        .unwrap();
    world.sprite_add_body(a, BodyOptions::default());
    world.sprite_add_body(b, BodyOptions::default());

    let hits: Rc<RefCell<Vec<(String, String)>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = hits.clone();
    world.set_collision_callback(Box::new(move |a, b| {
        sink.borrow_mut().push((a.to_owned(), b.to_owned()));
    }));
    world.set_sprite_velocity(a, vec2(4.0, 0.0));

    for _ in 0..60 {
        world.update(1.0 / 60.0);
    }

    let hits = hits.borrow();
    assert!(
        hits.iter().any(|(x, y)| {
            (x == "runner" && y == "target") || (x == "target" && y == "runner")
        }),
        "expected a runner/target contact, got {:?}",
        *hits
    );
    // Names resolve through collider user data, never to "unknown" here.
    assert!(hits.iter().all(|(x, y)| x != "unknown" && y != "unknown"));
}

#[test]
fn unnamed_bodies_resolve_to_unknown() {
    let mut world = bordered_world(WorldConfig {
        gravity: vec2(0.0, 0.0),
        ..Default::default()
    });
    let idx = world
        .create_sprite("scout", 1, vec2(-0.6, 0.0), vec2(0.3, 0.3))
        .unwrap();
    world.sprite_add_body(idx, BodyOptions::default());

    let hits: Rc<RefCell<Vec<(String, String)>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = hits.clone();
    world.set_collision_callback(Box::new(move |a, b| {
        sink.borrow_mut().push((a.to_owned(), b.to_owned()));
    }));

    // A body created behind the registry's back, with user_data 0.
    let opts = BodyOptions::default();
    let body = world.physics.add_body(vec2(0.6, 0.0), 0.0, &opts);
    world.physics.attach_collider(
        body,
        rapier2d::prelude::ColliderBuilder::cuboid(0.15, 0.15),
        &opts,
        0,
        true,
    );
    world.set_sprite_velocity(idx, vec2(4.0, 0.0));

    for _ in 0..60 {
        world.update(1.0 / 60.0);
    }

    let hits = hits.borrow();
    assert!(
        hits.iter()
            .any(|(x, y)| (x == "scout" && y == "unknown") || (x == "unknown" && y == "scout")),
        "expected an unknown participant, got {:?}",
        *hits
    );
}

#[test]
fn re_attaching_a_body_replaces_the_old_one() {
    let mut world = World::new(WorldConfig {
        gravity: vec2(0.0, 0.0),
        ..Default::default()
    });
    let idx = world
        .create_sprite("crate", 1, vec2(0.0, 0.0), vec2(0.4, 0.4))
        .unwrap();
    world.sprite_add_body(idx, BodyOptions::default());
    let first = world.sprite(idx).unwrap().body.unwrap().handle;

    world.sprite_add_body(idx, BodyOptions::default());
    let second = world.sprite(idx).unwrap().body.unwrap().handle;

    assert!(!world.physics.is_valid(first), "old body was removed");
    assert!(world.physics.is_valid(second));
    assert_eq!(world.physics.bodies.len(), 1);
}

#[test]
fn deadzone_camera_tracks_sprite_through_the_world_update() {
    let mut world = bordered_world(WorldConfig {
        gravity: vec2(0.0, 0.0),
        ..Default::default()
    });
    let idx = world
        .create_sprite("player", 1, vec2(0.0, 0.0), vec2(0.3, 0.3))
        .unwrap();
    world.camera.mode = CameraMode::FollowDeadzone {
        sprite: idx,
        width: 2.0,
        height: 2.0,
    };

    // Inside the zone: the camera does not move.
    world.set_sprite_position(idx, vec2(0.5, 0.0));
    world.update(1.0 / 60.0);
    assert_eq!(world.camera.target.x, 0.0);

    // Outside: the target lands exactly at sprite.x minus the half-width.
    world.set_sprite_position(idx, vec2(3.0, 0.0));
    world.update(1.0 / 60.0);
    assert!((world.camera.target.x - 2.0).abs() < 1e-6);
}

#[test]
fn long_stalls_are_clamped_to_one_short_step() {
    let mut world = World::new(WorldConfig::default());
    let idx = world
        .create_sprite("faller", 1, vec2(0.0, 10.0), vec2(0.3, 0.3))
        .unwrap();
    world.sprite_add_body(idx, BodyOptions::default());

    // A 10 second dt must advance like a single 16 ms frame.
    world.update(10.0);
    let vel = world
        .sprite(idx)
        .and_then(|s| s.body)
        .and_then(|b| world.physics.linvel(b.handle))
        .unwrap();
    assert!(vel.y.abs() < 1.0, "velocity {:?} after clamped stall", vel);
}

#[test]
fn queued_removals_apply_at_the_next_update() {
    let mut world = World::new(WorldConfig::default());
    let a = world
        .create_sprite("a", 1, vec2(0.0, 0.0), vec2(0.3, 0.3))
        .unwrap();
    let _b = world
        .create_sprite("b", 1, vec2(1.0, 0.0), vec2(0.3, 0.3))
        .unwrap();
    world.queue_remove_sprite(a);
    assert_eq!(world.sprite_count(), 2, "removal is deferred");
    world.update(1.0 / 60.0);
    assert_eq!(world.sprite_count(), 1);
    assert_eq!(world.find_sprite("b"), Some(0), "survivors compact down");
}
