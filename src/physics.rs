use crossbeam::channel::{unbounded, Receiver};
use macroquad::prelude::{vec2, Vec2};
use rapier2d::prelude::*;

pub const DEFAULT_GRAVITY: Vec2 = Vec2::new(0.0, -10.0);
pub const DEFAULT_SUBSTEPS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Dynamic,
    Static,
    Kinematic,
}

/// Options for attaching a body to a sprite or the maze camera.
#[derive(Debug, Clone, Copy)]
pub struct BodyOptions {
    pub kind: BodyKind,
    pub density: f32,
    pub friction: f32,
    pub restitution: f32,
    pub fixed_rotation: bool,
    pub bullet: bool,
    pub sensor: bool,
    pub gravity_scale: f32,
}

impl Default for BodyOptions {
    fn default() -> Self {
        Self {
            kind: BodyKind::Dynamic,
            density: 1.0,
            friction: 0.3,
            restitution: 0.0,
            fixed_rotation: false,
            bullet: false,
            sensor: false,
            gravity_scale: 1.0,
        }
    }
}

/// The rigid-body world. Every accessor that takes a handle checks liveness
/// first and turns a stale handle into a no-op or `None`; handles can outlive
/// their bodies (sprite removal, world reload).
pub struct Physics {
    pub bodies: RigidBodySet,
    pub colliders: ColliderSet,
    gravity: Vector<Real>,
    params: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd: CCDSolver,
    query: QueryPipeline,
    events: ChannelEventCollector,
    collision_rx: Receiver<CollisionEvent>,
    _force_rx: Receiver<ContactForceEvent>,
}

impl Physics {
    pub fn new(gravity: Vec2) -> Self {
        let (collision_tx, collision_rx) = unbounded();
        let (force_tx, force_rx) = unbounded();
        Self {
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            gravity: vector![gravity.x, gravity.y],
            params: IntegrationParameters::default(),
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            query: QueryPipeline::new(),
            events: ChannelEventCollector::new(collision_tx, force_tx),
            collision_rx,
            _force_rx: force_rx,
        }
    }

    pub fn gravity(&self) -> Vec2 {
        vec2(self.gravity.x, self.gravity.y)
    }

    pub fn set_gravity(&mut self, gx: f32, gy: f32) {
        self.gravity = vector![gx, gy];
        // Sleeping bodies would otherwise never notice the change.
        for (_, body) in self.bodies.iter_mut() {
            body.wake_up(true);
        }
    }

    /// Advance the simulation by `dt` seconds split across `substeps`
    /// equal sub-iterations, then refresh the query pipeline.
    pub fn step(&mut self, dt: f32, substeps: usize) {
        if dt <= 0.0 {
            return;
        }
        let substeps = substeps.max(1);
        self.params.dt = dt / substeps as f32;
        for _ in 0..substeps {
            self.pipeline.step(
                &self.gravity,
                &self.params,
                &mut self.islands,
                &mut self.broad_phase,
                &mut self.narrow_phase,
                &mut self.bodies,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                &mut self.ccd,
                Some(&mut self.query),
                &(),
                &self.events,
            );
        }
    }

    /// This frame's contact/sensor events. Must be drained every frame even
    /// when nobody listens, or the channel grows without bound.
    pub fn drain_collision_events(&mut self) -> Vec<CollisionEvent> {
        self.collision_rx.try_iter().collect()
    }

    pub fn add_body(&mut self, pos: Vec2, angle: f32, opts: &BodyOptions) -> RigidBodyHandle {
        let mut builder = match opts.kind {
            BodyKind::Dynamic => RigidBodyBuilder::dynamic(),
            BodyKind::Static => RigidBodyBuilder::fixed(),
            BodyKind::Kinematic => RigidBodyBuilder::kinematic_velocity_based(),
        };
        builder = builder
            .translation(vector![pos.x, pos.y])
            .rotation(angle)
            .gravity_scale(opts.gravity_scale)
            .ccd_enabled(opts.bullet);
        if opts.fixed_rotation {
            builder = builder.lock_rotations();
        }
        self.bodies.insert(builder)
    }

    pub fn attach_collider(
        &mut self,
        body: RigidBodyHandle,
        builder: ColliderBuilder,
        opts: &BodyOptions,
        user_data: u64,
        contact_events: bool,
    ) -> ColliderHandle {
        let mut builder = builder
            .density(opts.density)
            .friction(opts.friction)
            .restitution(opts.restitution)
            .sensor(opts.sensor)
            .user_data(user_data as u128);
        if contact_events {
            builder = builder.active_events(ActiveEvents::COLLISION_EVENTS);
        }
        self.colliders
            .insert_with_parent(builder, body, &mut self.bodies)
    }

    /// Retroactively turn on contact-event reporting for every collider.
    /// Bodies created after this must pass `contact_events = true` themselves.
    pub fn enable_all_contact_events(&mut self) {
        for (_, collider) in self.colliders.iter_mut() {
            collider.set_active_events(ActiveEvents::COLLISION_EVENTS);
        }
    }

    pub fn remove_body(&mut self, handle: RigidBodyHandle) {
        if !self.bodies.contains(handle) {
            return;
        }
        self.bodies.remove(
            handle,
            &mut self.islands,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
        self.query.update(&self.colliders);
    }

    pub fn is_valid(&self, handle: RigidBodyHandle) -> bool {
        self.bodies.contains(handle)
    }

    pub fn position(&self, handle: RigidBodyHandle) -> Option<(Vec2, f32)> {
        let body = self.bodies.get(handle)?;
        let t = body.translation();
        Some((vec2(t.x, t.y), body.rotation().angle()))
    }

    pub fn linvel(&self, handle: RigidBodyHandle) -> Option<Vec2> {
        let body = self.bodies.get(handle)?;
        let v = body.linvel();
        Some(vec2(v.x, v.y))
    }

    pub fn set_translation(&mut self, handle: RigidBodyHandle, pos: Vec2) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_translation(vector![pos.x, pos.y], true);
        }
    }

    pub fn set_rotation(&mut self, handle: RigidBodyHandle, angle: f32) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_rotation(Rotation::new(angle), true);
        }
    }

    pub fn set_linvel(&mut self, handle: RigidBodyHandle, vel: Vec2) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_linvel(vector![vel.x, vel.y], true);
        }
    }

    pub fn set_angvel(&mut self, handle: RigidBodyHandle, omega: f32) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_angvel(omega, true);
        }
    }

    pub fn apply_impulse(&mut self, handle: RigidBodyHandle, impulse: Vec2) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.apply_impulse(vector![impulse.x, impulse.y], true);
        }
    }

    pub fn apply_force(&mut self, handle: RigidBodyHandle, force: Vec2) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.add_force(vector![force.x, force.y], true);
        }
    }

    pub fn zero_velocities(&mut self, handle: RigidBodyHandle) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_linvel(vector![0.0, 0.0], false);
            body.set_angvel(0.0, false);
            body.reset_forces(false);
            body.reset_torques(false);
        }
    }

    pub fn collider_user_data(&self, handle: ColliderHandle) -> Option<u64> {
        self.colliders.get(handle).map(|c| c.user_data as u64)
    }

    pub fn collider_body(&self, handle: ColliderHandle) -> Option<RigidBodyHandle> {
        self.colliders.get(handle).and_then(|c| c.parent())
    }

    pub fn collider_is_sensor(&self, handle: ColliderHandle) -> bool {
        self.colliders
            .get(handle)
            .map(|c| c.is_sensor())
            .unwrap_or(false)
    }

    /// Broad-phase point overlap: does anything occupy `p`?
    pub fn point_hit(&self, p: Vec2, exclude: Option<RigidBodyHandle>) -> bool {
        let mut filter = QueryFilter::default();
        if let Some(h) = exclude {
            filter = filter.exclude_rigid_body(h);
        }
        let mut hit = false;
        self.query.intersections_with_point(
            &self.bodies,
            &self.colliders,
            &point![p.x, p.y],
            filter,
            |_| {
                hit = true;
                false // stop at the first hit
            },
        );
        hit
    }

    /// Broad-phase AABB overlap: does anything intersect the box `min..max`?
    pub fn aabb_hit(&self, min: Vec2, max: Vec2, exclude: Option<RigidBodyHandle>) -> bool {
        let mut filter = QueryFilter::default();
        if let Some(h) = exclude {
            filter = filter.exclude_rigid_body(h);
        }
        let half = vector![(max.x - min.x) / 2.0, (max.y - min.y) / 2.0];
        let center = Isometry::translation(min.x + half.x, min.y + half.y);
        let shape = Cuboid::new(half);
        let mut hit = false;
        self.query.intersections_with_shape(
            &self.bodies,
            &self.colliders,
            &center,
            &shape,
            filter,
            |_| {
                hit = true;
                false
            },
        );
        hit
    }

    /// Refresh spatial queries after out-of-step mutations (body creation,
    /// teleports) so point/AABB queries see them before the next step.
    pub fn refresh_queries(&mut self) {
        self.query.update(&self.colliders);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dynamic_body_falls_under_gravity() {
        let mut phys = Physics::new(DEFAULT_GRAVITY);
        let body = phys.add_body(vec2(0.0, 10.0), 0.0, &BodyOptions::default());
        phys.attach_collider(
            body,
            ColliderBuilder::ball(0.5),
            &BodyOptions::default(),
            0,
            false,
        );
        for _ in 0..30 {
            phys.step(1.0 / 60.0, DEFAULT_SUBSTEPS);
        }
        let (pos, _) = phys.position(body).expect("body alive");
        assert!(pos.y < 10.0);
    }

    #[test]
    fn stale_handles_are_noops() {
        let mut phys = Physics::new(DEFAULT_GRAVITY);
        let body = phys.add_body(vec2(0.0, 0.0), 0.0, &BodyOptions::default());
        phys.remove_body(body);
        assert!(!phys.is_valid(body));
        assert!(phys.position(body).is_none());
        phys.set_translation(body, vec2(1.0, 1.0)); // must not panic
        phys.apply_impulse(body, vec2(1.0, 0.0));
    }

    #[test]
    fn point_query_honors_exclusion() {
        let mut phys = Physics::new(vec2(0.0, 0.0));
        let opts = BodyOptions {
            kind: BodyKind::Static,
            ..Default::default()
        };
        let body = phys.add_body(vec2(0.0, 0.0), 0.0, &opts);
        phys.attach_collider(body, ColliderBuilder::cuboid(1.0, 1.0), &opts, 0, false);
        phys.refresh_queries();
        assert!(phys.point_hit(vec2(0.0, 0.0), None));
        assert!(!phys.point_hit(vec2(0.0, 0.0), Some(body)));
        assert!(!phys.point_hit(vec2(5.0, 5.0), None));
    }

    #[test]
    fn sensor_contact_produces_sensor_flagged_event() {
        let mut phys = Physics::new(vec2(0.0, 0.0));
        let sensor_opts = BodyOptions {
            kind: BodyKind::Static,
            sensor: true,
            ..Default::default()
        };
        let zone = phys.add_body(vec2(0.0, 0.0), 0.0, &sensor_opts);
        phys.attach_collider(
            zone,
            ColliderBuilder::cuboid(1.0, 1.0),
            &sensor_opts,
            1,
            true,
        );

        let opts = BodyOptions::default();
        let mover = phys.add_body(vec2(-3.0, 0.0), 0.0, &opts);
        phys.attach_collider(mover, ColliderBuilder::ball(0.5), &opts, 2, true);
        phys.set_linvel(mover, vec2(10.0, 0.0));

        let mut saw_sensor_start = false;
        for _ in 0..60 {
            phys.step(1.0 / 60.0, DEFAULT_SUBSTEPS);
            for ev in phys.drain_collision_events() {
                if let CollisionEvent::Started(_, _, flags) = ev {
                    if flags.contains(CollisionEventFlags::SENSOR) {
                        saw_sensor_start = true;
                    }
                }
            }
        }
        assert!(saw_sensor_start);
    }
}
