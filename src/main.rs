//! Headless demo: a seeded shooter scene driven through the frame loop
//!
//! Usage: `space-shooter [settings.json] [frames] [--json] [--grid]`
//!
//! Renders into a software canvas and logs what the pipeline did. With
//! `--json` every frame's statistics are written to stdout as JSON lines;
//! `--grid` shades the occupied broad-phase cells.

use std::collections::HashMap;

use glam::Vec2;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use space_shooter::perf::{JsonLinesSink, LogSink, PerfSink};
use space_shooter::renderer::{Canvas, SoftwareCanvas};
use space_shooter::sim::{
    Bounds, CollisionPair, Entity, EntityDesc, EntityId, EntityKind, EntityStore, ImageHandle, Visual,
    VisualFlags,
};
use space_shooter::{FrameInput, FrameLoop, Gameplay, Result, Settings};

const SCREEN_WIDTH: f32 = 800.0;
const SCREEN_HEIGHT: f32 = 600.0;
/// Simulated display refresh
const FRAME_DT: f32 = 1.0 / 60.0;
const DEFAULT_FRAMES: u64 = 600;
const SEED: u64 = 0x5EED_2D;

const PLAYER_IMG: ImageHandle = ImageHandle(1);
const ENEMY_IMG: ImageHandle = ImageHandle(2);
const BULLET_IMG: ImageHandle = ImageHandle(3);
const ENEMY_BULLET_IMG: ImageHandle = ImageHandle(4);
const POWERUP_IMG: ImageHandle = ImageHandle(5);
const EXPLOSION_IMG: ImageHandle = ImageHandle(6);

const BULLET_SPEED: f32 = 480.0;
const ENEMY_BULLET_SPEED: f32 = 240.0;
const EXPLOSION_LIFETIME: f32 = 0.3;
const VOLLEY_INTERVAL: f32 = 1.0;
const ENEMY_FIRE_INTERVAL: f32 = 0.5;

/// Bullets kill enemies, enemies shoot back, explosions fade out
struct DemoGameplay {
    rng: Pcg32,
    player: EntityId,
    explosions: HashMap<EntityId, f32>,
    volley_timer: f32,
    enemy_fire_timer: f32,
    kills: u32,
    player_hits: u32,
    powerups: u32,
}

impl DemoGameplay {
    fn new(rng: Pcg32, player: EntityId) -> Self {
        Self {
            rng,
            player,
            explosions: HashMap::new(),
            volley_timer: VOLLEY_INTERVAL,
            enemy_fire_timer: ENEMY_FIRE_INTERVAL,
            kills: 0,
            player_hits: 0,
            powerups: 0,
        }
    }

    fn spawn(&mut self, store: &mut EntityStore, desc: EntityDesc) -> Option<EntityId> {
        match store.spawn(desc) {
            Ok(id) => Some(id),
            Err(e) => {
                log::warn!("Spawn failed: {e}");
                None
            }
        }
    }

    fn fire_volley(&mut self, store: &mut EntityStore, count: usize) {
        let Some(origin) = store.get(self.player).map(|p| p.center()) else {
            return;
        };
        for _ in 0..count {
            let offset = Vec2::new(self.rng.random_range(-60.0..60.0), self.rng.random_range(-80.0..0.0));
            let desc = EntityDesc::new(
                EntityKind::Bullet,
                origin + offset,
                Vec2::new(4.0, 10.0),
                Visual::opaque(BULLET_IMG),
            )
            .with_vel(Vec2::new(0.0, -BULLET_SPEED));
            self.spawn(store, desc);
        }
    }

    fn enemies_fire(&mut self, store: &mut EntityStore) {
        let shooters: Vec<Vec2> = store
            .alive()
            .filter(|e| e.kind == EntityKind::Enemy)
            .map(|e| e.center())
            .collect();
        for _ in 0..shooters.len().min(3) {
            let from = shooters[self.rng.random_range(0..shooters.len())];
            let desc = EntityDesc::new(
                EntityKind::EnemyBullet,
                from,
                Vec2::new(6.0, 6.0),
                Visual::opaque(ENEMY_BULLET_IMG),
            )
            .with_vel(Vec2::new(0.0, ENEMY_BULLET_SPEED));
            self.spawn(store, desc);
        }
    }

    fn explode(&mut self, store: &mut EntityStore, at: Vec2) {
        let visual = Visual {
            image: EXPLOSION_IMG,
            flags: VisualFlags::ROTATED.union(VisualFlags::TRANSLUCENT),
            rotation: self.rng.random_range(0.0..std::f32::consts::TAU),
            alpha: 180,
        };
        let desc = EntityDesc::new(EntityKind::Effect, at - Vec2::splat(16.0), Vec2::splat(32.0), visual);
        if let Some(id) = self.spawn(store, desc) {
            self.explosions.insert(id, EXPLOSION_LIFETIME);
        }
    }
}

impl Gameplay for DemoGameplay {
    fn update(&mut self, store: &mut EntityStore, dt: f32) {
        // Enemies sway between the screen edges
        for enemy in store.iter_mut().filter(|e| e.kind == EntityKind::Enemy) {
            if (enemy.pos.x < 0.0 && enemy.vel.x < 0.0)
                || (enemy.pos.x + enemy.size.x > SCREEN_WIDTH && enemy.vel.x > 0.0)
            {
                enemy.vel.x = -enemy.vel.x;
            }
        }

        let mut expired = Vec::new();
        for (id, life) in self.explosions.iter_mut() {
            *life -= dt;
            if *life <= 0.0 {
                expired.push(*id);
            }
        }
        for id in expired {
            self.explosions.remove(&id);
            store.kill(id);
        }

        self.volley_timer -= dt;
        if self.volley_timer <= 0.0 {
            self.volley_timer += VOLLEY_INTERVAL;
            self.fire_volley(store, 50);
        }
        self.enemy_fire_timer -= dt;
        if self.enemy_fire_timer <= 0.0 {
            self.enemy_fire_timer += ENEMY_FIRE_INTERVAL;
            self.enemies_fire(store);
        }
    }

    fn on_collisions(&mut self, store: &mut EntityStore, pairs: &[CollisionPair]) {
        for pair in pairs {
            let (Some(a), Some(b)) = (store.get(pair.a), store.get(pair.b)) else {
                continue;
            };
            if !a.alive || !b.alive {
                continue;
            }
            let hit = if let Some((enemy, bullet)) = ordered(a, b, EntityKind::Enemy, EntityKind::Bullet) {
                Hit::EnemyDown {
                    enemy: enemy.id,
                    bullet: bullet.id,
                    at: enemy.center(),
                }
            } else if let Some((_, enemy)) = ordered(a, b, EntityKind::Player, EntityKind::Enemy) {
                Hit::PlayerHit(enemy.id)
            } else if let Some((_, shot)) = ordered(a, b, EntityKind::Player, EntityKind::EnemyBullet) {
                Hit::PlayerHit(shot.id)
            } else if let Some((_, powerup)) = ordered(a, b, EntityKind::Player, EntityKind::PowerUp) {
                Hit::PowerUp(powerup.id)
            } else {
                continue;
            };

            match hit {
                Hit::EnemyDown { enemy, bullet, at } => {
                    store.kill(enemy);
                    store.kill(bullet);
                    self.kills += 1;
                    self.explode(store, at);
                }
                Hit::PlayerHit(other) => {
                    store.kill(other);
                    self.player_hits += 1;
                    log::debug!("Player hit ({} total)", self.player_hits);
                }
                Hit::PowerUp(powerup) => {
                    store.kill(powerup);
                    self.powerups += 1;
                    log::info!("Power-up collected");
                }
            }
        }
    }
}

/// Gameplay outcome of one colliding pair
enum Hit {
    EnemyDown { enemy: EntityId, bullet: EntityId, at: Vec2 },
    PlayerHit(EntityId),
    PowerUp(EntityId),
}

/// The pair as (`first`, `second`) when the kinds match in either order
fn ordered<'a>(
    a: &'a Entity,
    b: &'a Entity,
    first: EntityKind,
    second: EntityKind,
) -> Option<(&'a Entity, &'a Entity)> {
    if a.kind == first && b.kind == second {
        Some((a, b))
    } else if b.kind == first && a.kind == second {
        Some((b, a))
    } else {
        None
    }
}

/// Player, three enemy rows, a 500-bullet volley and a few power-ups
fn build_scene(store: &mut EntityStore, rng: &mut Pcg32) -> Result<EntityId> {
    let player = store.spawn(EntityDesc::new(
        EntityKind::Player,
        Vec2::new(SCREEN_WIDTH / 2.0 - 16.0, SCREEN_HEIGHT - 60.0),
        Vec2::new(32.0, 32.0),
        Visual::opaque(PLAYER_IMG),
    ))?;

    for row in 0..3 {
        let dir = if row % 2 == 0 { 1.0 } else { -1.0 };
        for col in 0..10 {
            store.spawn(
                EntityDesc::new(
                    EntityKind::Enemy,
                    Vec2::new(60.0 + col as f32 * 68.0, 40.0 + row as f32 * 44.0),
                    Vec2::new(28.0, 24.0),
                    Visual::opaque(ENEMY_IMG),
                )
                .with_vel(Vec2::new(40.0 * dir, 0.0)),
            )?;
        }
    }

    for _ in 0..500 {
        let pos = Vec2::new(rng.random_range(20.0..780.0), rng.random_range(300.0..560.0));
        store.spawn(
            EntityDesc::new(EntityKind::Bullet, pos, Vec2::new(4.0, 10.0), Visual::opaque(BULLET_IMG))
                .with_vel(Vec2::new(0.0, -BULLET_SPEED)),
        )?;
    }

    for _ in 0..3 {
        let pos = Vec2::new(rng.random_range(100.0..700.0), rng.random_range(200.0..400.0));
        store.spawn(
            EntityDesc::new(
                EntityKind::PowerUp,
                pos,
                Vec2::new(20.0, 20.0),
                Visual::translucent(POWERUP_IMG, 200),
            )
            .with_vel(Vec2::new(0.0, 30.0)),
        )?;
    }

    log::info!("Scene built with {} entities", store.len());
    Ok(player)
}

fn canvas() -> SoftwareCanvas {
    let mut canvas = SoftwareCanvas::new(SCREEN_WIDTH as u32, SCREEN_HEIGHT as u32);
    canvas.set_image_color(PLAYER_IMG, 0xFF40_C0FF);
    canvas.set_image_color(ENEMY_IMG, 0xFFFF_4040);
    canvas.set_image_color(BULLET_IMG, 0xFFFF_FF80);
    canvas.set_image_color(ENEMY_BULLET_IMG, 0xFFFF_8000);
    canvas.set_image_color(POWERUP_IMG, 0xFF40_FF40);
    canvas.set_image_color(EXPLOSION_IMG, 0xFFFF_C040);
    canvas
}

fn main() -> Result<()> {
    env_logger::init();
    log::info!("Space Shooter frame core demo starting...");

    let mut settings_path = None;
    let mut frames = DEFAULT_FRAMES;
    let mut json = false;
    let mut grid = false;
    for arg in std::env::args().skip(1) {
        if arg == "--json" {
            json = true;
        } else if arg == "--grid" {
            grid = true;
        } else if let Ok(n) = arg.parse::<u64>() {
            frames = n;
        } else {
            settings_path = Some(arg);
        }
    }

    let settings = match &settings_path {
        Some(path) => Settings::load_or_default(path),
        None => Settings::default(),
    };
    let mut frame_loop = FrameLoop::new(settings)?;
    if grid && !frame_loop.settings().show_grid_debug {
        frame_loop.toggle_grid_debug();
    }
    let mut rng = Pcg32::seed_from_u64(SEED);
    let player = build_scene(frame_loop.store_mut(), &mut rng)?;
    let mut game = DemoGameplay::new(Pcg32::seed_from_u64(SEED ^ 0xA5A5), player);

    let mut sink: Box<dyn PerfSink> = if json {
        Box::new(JsonLinesSink::new(std::io::stdout().lock()))
    } else {
        Box::new(LogSink)
    };

    let mut canvas = canvas();
    let frame_area = (canvas.size().0 as u64 * canvas.size().1 as u64).max(1);
    let input = FrameInput::new(Bounds::new(0.0, 0.0, SCREEN_WIDTH, SCREEN_HEIGHT));
    let mut full_redraws = 0u64;
    let mut presented = 0u64;
    let mut draw_calls = 0u64;
    let mut batched = 0u64;
    let mut collisions = 0u64;

    for _ in 0..frames {
        let out = frame_loop.advance(FRAME_DT, &input, &mut game);
        out.draw_list.execute(&mut canvas);

        if out.draw_list.is_full_redraw() {
            full_redraws += 1;
        }
        presented += canvas.stats().presented_pixels;
        draw_calls += out.stats.render.batch.draw_calls() as u64;
        batched += out.stats.render.batch.batched_sprites as u64;
        collisions += out.collisions.len() as u64;

        sink.record_frame(&out.stats)?;
        if let Some(report) = &out.report {
            sink.record_report(report)?;
        }
        if let Some(warning) = &out.leak_warning {
            sink.record_leak(warning)?;
        }
    }
    sink.record_report(&frame_loop.monitor().snapshot())?;

    let frames = frames.max(1);
    log::info!(
        "{} frames: {} full redraws, {:.1}% of pixels presented on average",
        frames,
        full_redraws,
        presented as f64 / (frames * frame_area) as f64 * 100.0
    );
    log::info!(
        "{:.1} draw calls per frame, {} sprites drawn through batches, {} collisions",
        draw_calls as f64 / frames as f64,
        batched,
        collisions
    );
    log::info!(
        "Enemies destroyed: {}, player hits: {}, power-ups: {}, entities left: {}",
        game.kills,
        game.player_hits,
        game.powerups,
        frame_loop.store().len()
    );
    Ok(())
}
