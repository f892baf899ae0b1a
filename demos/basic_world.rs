use macroquad::prelude::*;
use tilebox::{BodyOptions, CameraMode, World, WorldConfig};

fn window_conf() -> Conf {
    Conf {
        window_title: "Basic World".into(),
        window_width: 1280,
        window_height: 720,
        ..Default::default()
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::init();

    let mut world = World::new(WorldConfig::default());
    world
        .load_tilemap("assets/map.json")
        .await
        .expect("Failed to load map");

    let player = world
        .create_sprite("player", 2, vec2(0.0, 1.0), vec2(0.8, 0.8))
        .expect("sprite slot");
    world.sprite_add_body(
        player,
        BodyOptions {
            fixed_rotation: true,
            ..Default::default()
        },
    );

    world.camera.mode = CameraMode::FollowDeadzone {
        sprite: player,
        width: 3.0,
        height: 2.0,
    };
    world.camera.smooth_speed = 6.0;

    world.set_collision_callback(Box::new(|a, b| {
        println!("contact: {a} <-> {b}");
    }));

    loop {
        let mut vx = 0.0;
        if is_key_down(KeyCode::A) {
            vx -= 4.0;
        }
        if is_key_down(KeyCode::D) {
            vx += 4.0;
        }
        if vx != 0.0 {
            world.sprite_apply_force(player, vec2(vx * 10.0, 0.0));
        }
        if is_key_pressed(KeyCode::Space) {
            world.sprite_apply_impulse(player, vec2(0.0, 3.0));
        }

        world.update(get_frame_time());

        clear_background(BLACK);
        world.draw();
        draw_text(&format!("FPS: {}", get_fps()), 20.0, 30.0, 30.0, RED);

        next_frame().await;
    }
}
