use macroquad::prelude::*;
use tilebox::{MazeConfig, World, WorldConfig};

fn window_conf() -> Conf {
    Conf {
        window_title: "Maze".into(),
        window_width: 1280,
        window_height: 720,
        ..Default::default()
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::init();

    let mut world = World::new(WorldConfig {
        gravity: vec2(0.0, 0.0),
        ..Default::default()
    });
    world
        .load_tilemap("assets/map.json")
        .await
        .expect("Failed to load map");

    let maze_config = MazeConfig {
        wall_gid: 1,
        floor_gid: Some(3),
        ceiling_gid: Some(4),
        ..Default::default()
    };
    world
        .maze_enable(maze_config.clone())
        .expect("maze enable");
    world
        .maze_add_item("coin", vec![5, 6], 6.0, (2, 2), vec2(0.3, 0.3))
        .expect("item slot");

    world.set_pickup_callback(Box::new(|idx, name| {
        println!("picked up #{idx}: {name}");
    }));

    set_cursor_grab(true);
    show_mouse(false);
    let mut last_mouse = mouse_position();

    loop {
        let dt = get_frame_time();

        let mut forward = 0.0;
        let mut strafe = 0.0;
        if is_key_down(KeyCode::W) {
            forward += 2.0;
        }
        if is_key_down(KeyCode::S) {
            forward -= 2.0;
        }
        if is_key_down(KeyCode::A) {
            strafe -= 2.0;
        }
        if is_key_down(KeyCode::D) {
            strafe += 2.0;
        }
        world.maze_move(forward, strafe, dt);

        let mouse = mouse_position();
        let (dx, dy) = (mouse.0 - last_mouse.0, mouse.1 - last_mouse.1);
        last_mouse = mouse;
        world.maze_turn(dx * 0.003, -dy * 0.003);

        // Tab toggles between the maze view and the 2D map with the minimap
        // marker.
        if is_key_pressed(KeyCode::Tab) {
            if world.maze().is_some_and(|m| m.enabled) {
                world.maze_disable();
            } else {
                world.maze_enable(maze_config.clone()).ok();
            }
        }

        world.update(dt);

        clear_background(DARKGRAY);
        world.draw();
        draw_text(&format!("FPS: {}", get_fps()), 20.0, 30.0, 30.0, RED);

        next_frame().await;
    }
}
