//! Frame orchestration
//!
//! One call to [`FrameLoop::advance`] is one rendered frame:
//! - Fixed `SIM_DT` substeps drained from an accumulator (update, broad
//!   phase, collision, gameplay reaction, sweep)
//! - Visibility refresh at the interpolated positions
//! - Dirty-rectangle render into a [`DrawList`]
//! - Memory sampling and frame accounting
//!
//! The loop owns the entity store, the spatial index, the renderer state and
//! the monitor for the whole frame; gameplay only sees them through the
//! [`Gameplay`] hooks.

use serde::Serialize;

use crate::consts::{MAX_FRAME_DT, MAX_SUBSTEPS, SIM_DT};
use crate::error::Result;
use crate::perf::{LeakWarning, PerfSnapshot, PerformanceMonitor, Section, SectionTimes};
use crate::renderer::{DirtyRectRenderer, DirtyStats, DrawList, GridOverlay, OverlayPanel};
use crate::settings::Settings;
use crate::sim::{
    Bounds, CollisionPair, CollisionResolver, CollisionStats, EntityId, EntityStore, SpatialIndex,
    VisibilityTracker, integrate, snapshot_previous,
};

/// Game rules plugged into the loop
pub trait Gameplay {
    /// Runs once per substep before motion is integrated
    fn update(&mut self, _store: &mut EntityStore, _dt: f32) {}

    /// Pairs found in one substep, each reported once per frame
    fn on_collisions(&mut self, _store: &mut EntityStore, _pairs: &[CollisionPair]) {}
}

/// No rules: entities just move
impl Gameplay for () {}

/// Per-frame input from the surrounding game
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInput {
    /// Visible world rectangle; its size is the frame size in pixels
    pub viewport: Bounds,
    pub paused: bool,
    pub force_full_redraw: bool,
}

impl FrameInput {
    pub fn new(viewport: Bounds) -> Self {
        Self {
            viewport,
            paused: false,
            force_full_redraw: false,
        }
    }
}

/// Everything measured during one frame
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FrameStats {
    pub frame: u64,
    pub substeps: u32,
    pub paused: bool,
    /// Interpolation factor used for rendering
    pub alpha: f32,
    pub entities: usize,
    pub visible: usize,
    pub collisions: usize,
    pub collision: CollisionStats,
    pub cells_in_use: usize,
    pub max_cell_occupancy: usize,
    /// Entities removed for leaving the world
    pub despawned: usize,
    /// Entities the spatial index refused
    pub rejected: usize,
    pub render: DirtyStats,
    pub timings: SectionTimes,
    pub fps: f64,
}

/// Result of one frame
#[derive(Debug, Clone)]
pub struct FrameOutput {
    /// Colliding pairs found this frame, in discovery order
    pub collisions: Vec<CollisionPair>,
    /// Visible ids, in id order
    pub visible: Vec<EntityId>,
    pub draw_list: DrawList,
    pub stats: FrameStats,
    /// Periodic performance report, when one was due
    pub report: Option<PerfSnapshot>,
    pub leak_warning: Option<LeakWarning>,
}

#[derive(Debug, Default)]
struct StepCounts {
    despawned: usize,
    rejected: usize,
}

/// Semi-fixed timestep loop over the frame pipeline
pub struct FrameLoop {
    settings: Settings,
    store: EntityStore,
    index: SpatialIndex,
    resolver: CollisionResolver,
    visibility: VisibilityTracker,
    renderer: DirtyRectRenderer,
    monitor: PerformanceMonitor,
    accumulator: f32,
    frame: u64,
}

impl FrameLoop {
    pub fn new(settings: Settings) -> Result<Self> {
        settings.validate()?;
        let monitor = PerformanceMonitor::new(&settings);
        Self::with_monitor(settings, monitor)
    }

    /// Loop with a caller-built monitor (custom memory source, tests)
    pub fn with_monitor(settings: Settings, monitor: PerformanceMonitor) -> Result<Self> {
        settings.validate()?;
        let index = SpatialIndex::new(settings.cell_size)?;
        log::info!(
            "Frame loop ready: cell size {}, padding {}px, batch min {}, full redraw every {} frames",
            settings.cell_size,
            settings.dirty_padding,
            settings.batch_min,
            settings.full_redraw_interval
        );
        Ok(Self {
            visibility: VisibilityTracker::new(settings.viewport_margin, settings.despawn_margin),
            renderer: DirtyRectRenderer::new(&settings),
            store: EntityStore::new(),
            index,
            resolver: CollisionResolver::new(),
            monitor,
            accumulator: 0.0,
            frame: 0,
            settings,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut EntityStore {
        &mut self.store
    }

    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    pub fn renderer(&self) -> &DirtyRectRenderer {
        &self.renderer
    }

    pub fn monitor(&self) -> &PerformanceMonitor {
        &self.monitor
    }

    pub fn monitor_mut(&mut self) -> &mut PerformanceMonitor {
        &mut self.monitor
    }

    /// Visible ids from the latest frame
    pub fn visible(&self) -> &[EntityId] {
        self.visibility.visible()
    }

    /// Unsimulated time carried into the next frame (seconds)
    pub fn accumulator(&self) -> f32 {
        self.accumulator
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Show or hide the performance overlay; returns the new state
    pub fn toggle_overlay(&mut self) -> bool {
        self.settings.show_overlay = !self.settings.show_overlay;
        self.settings.show_overlay
    }

    /// Show or hide the broad-phase cell view; returns the new state
    pub fn toggle_grid_debug(&mut self) -> bool {
        self.settings.show_grid_debug = !self.settings.show_grid_debug;
        log::info!(
            "Spatial grid view {}",
            if self.settings.show_grid_debug { "on" } else { "off" }
        );
        self.settings.show_grid_debug
    }

    pub fn request_full_redraw(&mut self) {
        self.renderer.request_full_redraw();
    }

    /// Drop everything but the player and start from a clean frame
    pub fn reset(&mut self) {
        self.store.retain_player();
        self.index.clear();
        self.accumulator = 0.0;
        self.renderer.request_full_redraw();
    }

    /// Run one frame given `elapsed` real seconds since the previous one
    pub fn advance(&mut self, elapsed: f32, input: &FrameInput, gameplay: &mut impl Gameplay) -> FrameOutput {
        self.frame += 1;
        self.monitor.begin_frame();
        let real_elapsed = if elapsed.is_finite() { elapsed.max(0.0) } else { 0.0 };

        if input.force_full_redraw {
            self.renderer.request_full_redraw();
        }

        // Simulation: zero or more fixed substeps
        self.resolver.begin_frame();
        let mut collisions = Vec::new();
        let mut counts = StepCounts::default();
        let mut substeps = 0;
        if !input.paused {
            self.accumulator += real_elapsed.min(MAX_FRAME_DT);
            while self.accumulator >= SIM_DT && substeps < MAX_SUBSTEPS {
                self.step(&input.viewport, gameplay, &mut collisions, &mut counts);
                self.accumulator -= SIM_DT;
                substeps += 1;
            }
            if self.accumulator >= SIM_DT {
                log::debug!(
                    "Dropping {:.1}ms of simulation backlog",
                    (self.accumulator - self.accumulator % SIM_DT) * 1000.0
                );
                self.accumulator %= SIM_DT;
            }
        }
        let alpha = (self.accumulator / SIM_DT).clamp(0.0, 1.0);

        // Render at the interpolated state
        let visible = self.visibility.refresh(&self.store, &input.viewport, alpha).to_vec();
        let overlay = self.settings.show_overlay.then(|| OverlayPanel {
            rect: self.settings.overlay_rect,
            lines: self.monitor.overlay_lines(),
        });
        let grid = self
            .settings
            .show_grid_debug
            .then(|| GridOverlay::from_index(&self.index, &input.viewport));
        self.renderer.set_grid_overlay(grid);
        self.monitor.begin_section(Section::Render);
        let draw_list = self
            .renderer
            .render(&self.store, &visible, &input.viewport, alpha, overlay.as_ref());
        self.monitor.end_section(Section::Render);

        let leak_warning = self.monitor.sample_memory();
        let report = self.monitor.end_frame(real_elapsed);

        let stats = FrameStats {
            frame: self.frame,
            substeps,
            paused: input.paused,
            alpha,
            entities: self.store.len(),
            visible: visible.len(),
            collisions: collisions.len(),
            collision: self.resolver.stats(),
            cells_in_use: self.index.cells_in_use(),
            max_cell_occupancy: self.index.max_occupancy(),
            despawned: counts.despawned,
            rejected: counts.rejected,
            render: self.renderer.stats(),
            timings: self.monitor.last_times(),
            fps: self.monitor.fps(),
        };

        FrameOutput {
            collisions,
            visible,
            draw_list,
            stats,
            report,
            leak_warning,
        }
    }

    /// One fixed substep: update, broad phase, collision, gameplay, sweep
    fn step(
        &mut self,
        viewport: &Bounds,
        gameplay: &mut impl Gameplay,
        collisions: &mut Vec<CollisionPair>,
        counts: &mut StepCounts,
    ) {
        self.monitor.begin_section(Section::Update);
        snapshot_previous(&mut self.store);
        gameplay.update(&mut self.store, SIM_DT);
        integrate(&mut self.store, SIM_DT);
        counts.despawned += self.visibility.despawn_out_of_world(&mut self.store, viewport);
        self.monitor.end_section(Section::Update);

        self.monitor.begin_section(Section::Collision);
        let rejected = self.index.rebuild(self.store.iter());
        for &id in &rejected {
            self.store.kill(id);
        }
        counts.rejected += rejected.len();
        let pairs = self.resolver.resolve(&self.store, &self.index);
        self.monitor.end_section(Section::Collision);

        if !pairs.is_empty() {
            gameplay.on_collisions(&mut self.store, &pairs);
            collisions.extend_from_slice(&pairs);
        }
        self.store.sweep_dead();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::perf::PerformanceMonitor;
    use crate::renderer::DrawOp;
    use crate::sim::{EntityDesc, EntityKind, ImageHandle, Region, Visual};
    use glam::Vec2;

    const VIEWPORT: Bounds = Bounds {
        pos: Vec2::ZERO,
        size: Vec2::new(800.0, 600.0),
    };

    fn frame_loop(settings: Settings) -> FrameLoop {
        let monitor = PerformanceMonitor::with_memory_source(&settings, None);
        FrameLoop::with_monitor(settings, monitor).unwrap()
    }

    fn spawn(fl: &mut FrameLoop, kind: EntityKind, x: f32, y: f32, vel: Vec2) -> EntityId {
        fl.store_mut()
            .spawn(
                EntityDesc::new(kind, Vec2::new(x, y), Vec2::new(20.0, 20.0), Visual::opaque(ImageHandle(1)))
                    .with_vel(vel),
            )
            .unwrap()
    }

    /// Kills both members of every reported pair
    #[derive(Default)]
    struct KillOnHit {
        updates: u32,
        reported: Vec<CollisionPair>,
    }

    impl Gameplay for KillOnHit {
        fn update(&mut self, _store: &mut EntityStore, dt: f32) {
            assert_eq!(dt, SIM_DT);
            self.updates += 1;
        }

        fn on_collisions(&mut self, store: &mut EntityStore, pairs: &[CollisionPair]) {
            for pair in pairs {
                store.kill(pair.a);
                store.kill(pair.b);
            }
            self.reported.extend_from_slice(pairs);
        }
    }

    /// Records pairs without reacting
    #[derive(Default)]
    struct Observe(Vec<CollisionPair>);

    impl Gameplay for Observe {
        fn on_collisions(&mut self, _store: &mut EntityStore, pairs: &[CollisionPair]) {
            self.0.extend_from_slice(pairs);
        }
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        let settings = Settings {
            cell_size: 0.0,
            ..Settings::default()
        };
        assert!(FrameLoop::new(settings).is_err());
    }

    #[test]
    fn test_huge_slow_section_threshold_is_a_config_error() {
        let settings: Settings = serde_json::from_str(r#"{ "slow_section_ms": 1e25 }"#).unwrap();
        match FrameLoop::new(settings) {
            Err(CoreError::InvalidConfig { field, .. }) => assert_eq!(field, "slow_section_ms"),
            Err(other) => panic!("expected InvalidConfig, got {other:?}"),
            Ok(_) => panic!("out-of-range slow_section_ms was accepted"),
        }
    }

    #[test]
    fn test_substeps_follow_elapsed_time() {
        let mut fl = frame_loop(Settings::default());
        let input = FrameInput::new(VIEWPORT);
        let mut game = KillOnHit::default();

        assert_eq!(fl.advance(1.0 / 60.0, &input, &mut game).stats.substeps, 2);
        assert_eq!(fl.advance(1.0 / 240.0, &input, &mut game).stats.substeps, 0);
        assert_eq!(fl.advance(1.0 / 240.0, &input, &mut game).stats.substeps, 1);

        // A long stall is capped and the backlog dropped
        let out = fl.advance(2.0, &input, &mut game);
        assert_eq!(out.stats.substeps, MAX_SUBSTEPS);
        assert!(fl.accumulator() < SIM_DT);
        assert_eq!(game.updates, 2 + 1 + MAX_SUBSTEPS);
    }

    #[test]
    fn test_motion_scales_with_elapsed_time() {
        let mut fl = frame_loop(Settings::default());
        let id = spawn(&mut fl, EntityKind::Enemy, 100.0, 100.0, Vec2::new(120.0, 0.0));
        let input = FrameInput::new(VIEWPORT);
        for _ in 0..30 {
            fl.advance(1.0 / 60.0, &input, &mut ());
        }
        // Half a second at 120 px/s
        let x = fl.store().get(id).unwrap().pos.x;
        assert!((x - 160.0).abs() < 0.01, "x = {x}");
    }

    #[test]
    fn test_pause_freezes_simulation_but_renders() {
        let mut fl = frame_loop(Settings::default());
        let id = spawn(&mut fl, EntityKind::Enemy, 100.0, 100.0, Vec2::new(60.0, 0.0));
        let input = FrameInput {
            paused: true,
            ..FrameInput::new(VIEWPORT)
        };

        let out = fl.advance(1.0 / 60.0, &input, &mut ());
        assert_eq!(out.stats.substeps, 0);
        assert!(out.stats.paused);
        assert!(out.draw_list.is_full_redraw());
        assert_eq!(out.visible, vec![id]);
        assert_eq!(fl.store().get(id).unwrap().pos, Vec2::new(100.0, 100.0));

        // The frozen frame does not change
        let out = fl.advance(1.0 / 60.0, &input, &mut ());
        assert_eq!(out.stats.render.regions, 0);
        assert_eq!(fl.accumulator(), 0.0);
    }

    #[test]
    fn test_unchanged_scene_renders_nothing_twice() {
        let mut fl = frame_loop(Settings::default());
        for i in 0..20 {
            spawn(&mut fl, EntityKind::Enemy, 30.0 * i as f32, 40.0, Vec2::ZERO);
        }
        let input = FrameInput::new(VIEWPORT);
        fl.advance(1.0 / 60.0, &input, &mut ());

        for _ in 0..2 {
            let out = fl.advance(1.0 / 60.0, &input, &mut ());
            assert!(out.collisions.is_empty());
            assert_eq!(out.stats.render.regions, 0);
            assert!(out.draw_list.is_empty());
        }
    }

    #[test]
    fn test_collisions_reach_gameplay() {
        let mut fl = frame_loop(Settings::default());
        let bullet = spawn(&mut fl, EntityKind::Bullet, 100.0, 110.0, Vec2::ZERO);
        let enemy = spawn(&mut fl, EntityKind::Enemy, 100.0, 100.0, Vec2::ZERO);
        let bystander = spawn(&mut fl, EntityKind::Enemy, 400.0, 100.0, Vec2::ZERO);
        let mut game = KillOnHit::default();

        let out = fl.advance(1.0 / 60.0, &FrameInput::new(VIEWPORT), &mut game);
        assert_eq!(out.collisions, vec![CollisionPair::new(bullet, enemy)]);
        assert_eq!(game.reported, out.collisions);
        assert_eq!(out.stats.collisions, 1);
        assert!(fl.store().get(bullet).is_none());
        assert!(fl.store().get(enemy).is_none());
        assert!(fl.store().get(bystander).is_some());
        assert_eq!(out.visible, vec![bystander]);

        let out = fl.advance(1.0 / 60.0, &FrameInput::new(VIEWPORT), &mut game);
        assert!(out.collisions.is_empty());
    }

    #[test]
    fn test_pair_reported_once_per_frame() {
        let mut fl = frame_loop(Settings::default());
        spawn(&mut fl, EntityKind::Player, 100.0, 100.0, Vec2::ZERO);
        spawn(&mut fl, EntityKind::PowerUp, 105.0, 100.0, Vec2::ZERO);
        let mut game = Observe::default();

        // Several substeps, one report
        let out = fl.advance(0.05, &FrameInput::new(VIEWPORT), &mut game);
        assert!(out.stats.substeps >= 4);
        assert_eq!(out.collisions.len(), 1);

        // A new frame reports the still-touching pair again
        let out = fl.advance(1.0 / 60.0, &FrameInput::new(VIEWPORT), &mut game);
        assert_eq!(out.collisions.len(), 1);
        assert_eq!(game.0.len(), 2);
    }

    #[test]
    fn test_far_away_entities_are_despawned() {
        let mut fl = frame_loop(Settings::default());
        let player = spawn(&mut fl, EntityKind::Player, -5000.0, 0.0, Vec2::ZERO);
        let stray = spawn(&mut fl, EntityKind::Bullet, 100.0, -5000.0, Vec2::ZERO);

        let out = fl.advance(1.0 / 60.0, &FrameInput::new(VIEWPORT), &mut ());
        assert_eq!(out.stats.despawned, 1);
        assert!(fl.store().get(stray).is_none());
        assert!(fl.store().get(player).is_some());
    }

    #[test]
    fn test_oversized_entity_is_rejected_and_removed() {
        let mut fl = frame_loop(Settings::default());
        let huge = fl
            .store_mut()
            .spawn(EntityDesc::new(
                EntityKind::Enemy,
                Vec2::new(0.0, 0.0),
                Vec2::new(1.0e6, 1.0e6),
                Visual::opaque(ImageHandle(2)),
            ))
            .unwrap();
        let out = fl.advance(1.0 / 60.0, &FrameInput::new(VIEWPORT), &mut ());
        assert_eq!(out.stats.rejected, 1);
        assert!(fl.store().get(huge).is_none());
    }

    #[test]
    fn test_overlay_and_forced_redraw() {
        let settings = Settings {
            show_overlay: true,
            ..Settings::default()
        };
        let mut fl = frame_loop(settings);
        let input = FrameInput::new(VIEWPORT);
        fl.advance(1.0 / 60.0, &input, &mut ());

        let out = fl.advance(1.0 / 60.0, &input, &mut ());
        assert_eq!(out.draw_list.present_regions(), &[Region::new(5, 5, 200, 115)]);
        assert!(matches!(out.draw_list.ops().last(), Some(DrawOp::Overlay { .. })));

        assert!(!fl.toggle_overlay());
        let forced = FrameInput {
            force_full_redraw: true,
            ..input
        };
        let out = fl.advance(1.0 / 60.0, &forced, &mut ());
        assert!(out.draw_list.is_full_redraw());
        assert!(!out.draw_list.ops().iter().any(|op| matches!(op, DrawOp::Overlay { .. })));
    }

    #[test]
    fn test_grid_debug_shades_occupied_cells() {
        let mut fl = frame_loop(Settings::default());
        spawn(&mut fl, EntityKind::Enemy, 10.0, 10.0, Vec2::ZERO);
        spawn(&mut fl, EntityKind::Enemy, 20.0, 15.0, Vec2::ZERO);
        let input = FrameInput::new(VIEWPORT);
        fl.advance(1.0 / 60.0, &input, &mut ());

        assert!(fl.toggle_grid_debug());
        let out = fl.advance(1.0 / 60.0, &input, &mut ());
        assert_eq!(out.draw_list.present_regions(), &[Region::new(0, 0, 64, 64)]);
        let cells = out.draw_list.ops().iter().find_map(|op| match op {
            DrawOp::Grid { cells, .. } => Some(cells.clone()),
            _ => None,
        });
        assert_eq!(cells.map(|c| c[0].occupancy), Some(2));

        // Hidden again: the shaded cell is erased once, then nothing
        assert!(!fl.toggle_grid_debug());
        let out = fl.advance(1.0 / 60.0, &input, &mut ());
        assert_eq!(out.draw_list.present_regions(), &[Region::new(0, 0, 64, 64)]);
        assert!(!out.draw_list.ops().iter().any(|op| matches!(op, DrawOp::Grid { .. })));
        let out = fl.advance(1.0 / 60.0, &input, &mut ());
        assert!(out.draw_list.is_empty());
    }

    #[test]
    fn test_monitor_sees_sections() {
        let mut fl = frame_loop(Settings::default());
        spawn(&mut fl, EntityKind::Enemy, 10.0, 10.0, Vec2::new(10.0, 0.0));
        fl.advance(1.0 / 60.0, &FrameInput::new(VIEWPORT), &mut ());
        let snapshot = fl.monitor().snapshot();
        assert_eq!(snapshot.frame, 1);
        assert!(snapshot.sections.iter().all(|s| s.max_ms >= 0.0));
        assert!(fl.monitor().last(Section::Frame) >= fl.monitor().last(Section::Render));
    }

    #[test]
    fn test_reset_keeps_player() {
        let mut fl = frame_loop(Settings::default());
        let player = spawn(&mut fl, EntityKind::Player, 400.0, 500.0, Vec2::ZERO);
        spawn(&mut fl, EntityKind::Enemy, 100.0, 100.0, Vec2::ZERO);
        fl.advance(1.0 / 60.0, &FrameInput::new(VIEWPORT), &mut ());
        fl.reset();
        let out = fl.advance(1.0 / 60.0, &FrameInput::new(VIEWPORT), &mut ());
        assert_eq!(out.visible, vec![player]);
        assert_eq!(out.stats.render.full_redraw, Some(crate::renderer::RedrawReason::Requested));
    }
}
