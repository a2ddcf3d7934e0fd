//! Per-frame systems.
//!
//! A system is a named callback that receives the [`Scene`] and a
//! [`FrameContext`] and returns a [`SystemFlow`]. [`Scene::run_frame`] runs
//! every registered system once, in registration order, until one returns
//! [`SystemFlow::Stop`].
//!
//! # Example
//!
//! ```
//! use cinder_ecs::prelude::*;
//!
//! let mut scene = Scene::new(KindTable::new());
//! scene.add_system("spawn", |scene: &mut Scene, _ctx: &FrameContext| {
//!     scene.entity_new(Archetype::of(ComponentKind::TRANSFORM));
//!     SystemFlow::Continue
//! });
//! scene.add_system("quit_after_3", |_scene: &mut Scene, ctx: &FrameContext| {
//!     if ctx.frame == 2 { SystemFlow::Stop } else { SystemFlow::Continue }
//! });
//!
//! while scene.run_frame(1.0 / 60.0) == SystemFlow::Continue {}
//! assert_eq!(scene.frame_count(), 3);
//! assert_eq!(scene.entity_count(), 3);
//! ```

use std::time::{Duration, Instant};

use crate::hierarchy::{clear_dirty_system, update_dirty_system};
use crate::scene::Scene;

// ---------------------------------------------------------------------------
// FrameContext / SystemFlow
// ---------------------------------------------------------------------------

/// Per-frame values handed to every system.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameContext {
    /// Frames completed before this one.
    pub frame: u64,
    /// Seconds since the previous frame, as passed to `run_frame`.
    pub dt: f32,
    /// Sum of every previous frame's `dt`.
    pub time: f64,
}

/// What a system asks the runner to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemFlow {
    Continue,
    /// Skip the remaining systems this frame and report the stop to the caller.
    Stop,
}

// ---------------------------------------------------------------------------
// FrameDiagnostics
// ---------------------------------------------------------------------------

/// Timing of the last frame.
#[derive(Debug, Clone, Default)]
pub struct FrameDiagnostics {
    /// Wall-clock time per system that ran, in order of execution.
    pub system_times: Vec<(String, Duration)>,
    pub total_time: Duration,
    /// The system that returned [`SystemFlow::Stop`], if any.
    pub stopped_by: Option<String>,
}

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

/// A system callback.
pub type SystemFn = Box<dyn FnMut(&mut Scene, &FrameContext) -> SystemFlow>;

struct RegisteredSystem {
    name: String,
    func: SystemFn,
}

impl std::fmt::Debug for RegisteredSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredSystem")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Registered systems plus the frame clock. Owned by the scene.
///
/// `names` lists every registered system in execution order. While a frame
/// runs, the running systems are held by [`Scene::run_frame`] and `systems`
/// only collects those registered during the frame.
#[derive(Debug, Default)]
pub(crate) struct Schedule {
    systems: Vec<RegisteredSystem>,
    names: Vec<String>,
    frame: u64,
    time: f64,
    last_diagnostics: FrameDiagnostics,
}

impl Schedule {
    pub(crate) fn len(&self) -> usize {
        self.names.len()
    }

    fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    fn push(&mut self, system: RegisteredSystem) {
        assert!(!self.contains(&system.name), "duplicate system name: {:?}", system.name);
        self.names.push(system.name.clone());
        self.systems.push(system);
    }
}

impl Scene {
    /// Register a system to run every frame, after those already registered.
    ///
    /// # Panics
    ///
    /// Panics if a system with the same name is already registered, including
    /// one registered earlier in the frame that is currently running.
    pub fn add_system<F>(&mut self, name: &str, func: F)
    where
        F: FnMut(&mut Scene, &FrameContext) -> SystemFlow + 'static,
    {
        self.schedule.push(RegisteredSystem {
            name: name.to_owned(),
            func: Box::new(func),
        });
    }

    /// Register the hierarchy sweep: `"hierarchy_update"` recomputes world
    /// matrices below dirty entities, then `"hierarchy_clear_dirty"` clears
    /// every flag.
    pub fn add_hierarchy_systems(&mut self) {
        self.add_system("hierarchy_update", update_dirty_system);
        self.add_system("hierarchy_clear_dirty", clear_dirty_system);
    }

    /// Run one frame: every system in registration order until one returns
    /// [`SystemFlow::Stop`]. The frame counter and clock advance either way.
    ///
    /// Systems registered from inside a system start running next frame.
    /// The clock, names and diagnostics stay readable from inside systems.
    pub fn run_frame(&mut self, dt: f32) -> SystemFlow {
        let mut running = std::mem::take(&mut self.schedule.systems);
        let ctx = FrameContext {
            frame: self.schedule.frame,
            dt,
            time: self.schedule.time,
        };

        let frame_start = Instant::now();
        let mut system_times = Vec::with_capacity(running.len());
        let mut stopped_by = None;
        for system in &mut running {
            let sys_start = Instant::now();
            let flow = (system.func)(self, &ctx);
            system_times.push((system.name.clone(), sys_start.elapsed()));
            if flow == SystemFlow::Stop {
                tracing::debug!(system = %system.name, frame = ctx.frame, "system requested stop");
                stopped_by = Some(system.name.clone());
                break;
            }
        }

        let added = std::mem::replace(&mut self.schedule.systems, running);
        if !added.is_empty() {
            tracing::debug!(count = added.len(), frame = ctx.frame, "systems registered mid-frame");
        }
        self.schedule.systems.extend(added);
        self.schedule.frame += 1;
        self.schedule.time += f64::from(dt);
        self.schedule.last_diagnostics = FrameDiagnostics {
            system_times,
            total_time: frame_start.elapsed(),
            stopped_by: stopped_by.clone(),
        };

        match stopped_by {
            Some(_) => SystemFlow::Stop,
            None => SystemFlow::Continue,
        }
    }

    pub fn system_count(&self) -> usize {
        self.schedule.len()
    }

    /// Registered system names, in execution order.
    pub fn system_names(&self) -> Vec<&str> {
        self.schedule.names.iter().map(String::as_str).collect()
    }

    /// Frames run so far.
    pub fn frame_count(&self) -> u64 {
        self.schedule.frame
    }

    /// Sum of every `dt` passed to [`run_frame`](Self::run_frame).
    pub fn elapsed(&self) -> f64 {
        self.schedule.time
    }

    pub fn last_diagnostics(&self) -> &FrameDiagnostics {
        &self.schedule.last_diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archetype::Archetype;
    use crate::component::{ComponentKind, KindTable};
    use crate::transform::Transform;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn scene() -> Scene {
        Scene::new(KindTable::new())
    }

    #[test]
    fn systems_run_in_registration_order() {
        let mut s = scene();
        let log = Rc::new(RefCell::new(Vec::new()));
        for name in ["a", "b", "c"] {
            let log = log.clone();
            s.add_system(name, move |_: &mut Scene, _: &FrameContext| {
                log.borrow_mut().push(name);
                SystemFlow::Continue
            });
        }
        assert_eq!(s.run_frame(0.1), SystemFlow::Continue);
        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
        assert_eq!(s.system_names(), vec!["a", "b", "c"]);
    }

    #[test]
    fn stop_skips_remaining_systems() {
        let mut s = scene();
        let ran = Rc::new(RefCell::new(false));
        s.add_system("stop", |_: &mut Scene, _: &FrameContext| SystemFlow::Stop);
        let flag = ran.clone();
        s.add_system("after", move |_: &mut Scene, _: &FrameContext| {
            *flag.borrow_mut() = true;
            SystemFlow::Continue
        });
        assert_eq!(s.run_frame(0.1), SystemFlow::Stop);
        assert!(!*ran.borrow());
        let diag = s.last_diagnostics();
        assert_eq!(diag.stopped_by.as_deref(), Some("stop"));
        assert_eq!(diag.system_times.len(), 1);
        assert_eq!(s.frame_count(), 1);
    }

    #[test]
    fn frame_context_advances() {
        let mut s = scene();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        s.add_system("record", move |_: &mut Scene, ctx: &FrameContext| {
            sink.borrow_mut().push(*ctx);
            SystemFlow::Continue
        });
        s.run_frame(0.5);
        s.run_frame(0.25);
        let seen = seen.borrow();
        assert_eq!(seen[0], FrameContext { frame: 0, dt: 0.5, time: 0.0 });
        assert_eq!(seen[1], FrameContext { frame: 1, dt: 0.25, time: 0.5 });
        assert_eq!(s.elapsed(), 0.75);
    }

    #[test]
    #[should_panic(expected = "duplicate system name")]
    fn duplicate_name_panics() {
        let mut s = scene();
        s.add_system("x", |_: &mut Scene, _: &FrameContext| SystemFlow::Continue);
        s.add_system("x", |_: &mut Scene, _: &FrameContext| SystemFlow::Continue);
    }

    #[test]
    fn systems_added_mid_frame_run_next_frame() {
        let mut s = scene();
        let count = Rc::new(RefCell::new(0));
        let counter = count.clone();
        s.add_system("installer", move |scene: &mut Scene, ctx: &FrameContext| {
            if ctx.frame == 0 {
                let counter = counter.clone();
                scene.add_system("late", move |_: &mut Scene, _: &FrameContext| {
                    *counter.borrow_mut() += 1;
                    SystemFlow::Continue
                });
            }
            SystemFlow::Continue
        });
        s.run_frame(0.0);
        assert_eq!(*count.borrow(), 0);
        assert_eq!(s.system_count(), 2);
        s.run_frame(0.0);
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn clock_and_names_visible_inside_systems() {
        let mut s = scene();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        s.add_system("observer", move |scene: &mut Scene, ctx: &FrameContext| {
            sink.borrow_mut().push((
                ctx.frame,
                scene.frame_count(),
                scene.system_count(),
                scene.system_names().len(),
            ));
            SystemFlow::Continue
        });
        s.run_frame(0.1);
        s.run_frame(0.1);
        s.run_frame(0.1);
        assert_eq!(*seen.borrow(), vec![(0, 0, 1, 1), (1, 1, 1, 1), (2, 2, 1, 1)]);
    }

    #[test]
    fn elapsed_and_diagnostics_visible_inside_systems() {
        let mut s = scene();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        s.add_system("observer", move |scene: &mut Scene, ctx: &FrameContext| {
            sink.borrow_mut()
                .push((scene.elapsed(), ctx.time, scene.last_diagnostics().system_times.len()));
            SystemFlow::Continue
        });
        s.run_frame(0.5);
        s.run_frame(0.5);
        assert_eq!(*seen.borrow(), vec![(0.0, 0.0, 0), (0.5, 0.5, 1)]);
    }

    #[test]
    #[should_panic(expected = "duplicate system name")]
    fn duplicate_name_registered_mid_frame_panics() {
        let mut s = scene();
        s.add_system("a", |scene: &mut Scene, _: &FrameContext| {
            scene.add_system("a", |_: &mut Scene, _: &FrameContext| SystemFlow::Continue);
            SystemFlow::Continue
        });
        s.run_frame(0.0);
    }

    #[test]
    fn duplicate_name_mid_frame_fails_at_call_site() {
        let mut s = scene();
        let reached = Rc::new(RefCell::new(false));
        let flag = reached.clone();
        s.add_system("a", move |scene: &mut Scene, _: &FrameContext| {
            let dup = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                scene.add_system("a", |_: &mut Scene, _: &FrameContext| SystemFlow::Continue);
            }));
            assert!(dup.is_err());
            *flag.borrow_mut() = true;
            SystemFlow::Continue
        });
        s.run_frame(0.0);
        assert!(*reached.borrow());
        assert_eq!(s.system_count(), 1);
        assert_eq!(s.system_names(), vec!["a"]);
        assert_eq!(s.frame_count(), 1);
    }

    #[test]
    fn names_registered_mid_frame_are_checked_against_each_other() {
        let mut s = scene();
        s.add_system("installer", |scene: &mut Scene, ctx: &FrameContext| {
            if ctx.frame == 0 {
                scene.add_system("late", |_: &mut Scene, _: &FrameContext| SystemFlow::Continue);
                let dup = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    scene.add_system("late", |_: &mut Scene, _: &FrameContext| SystemFlow::Continue);
                }));
                assert!(dup.is_err());
            }
            SystemFlow::Continue
        });
        s.run_frame(0.0);
        assert_eq!(s.system_names(), vec!["installer", "late"]);
        s.run_frame(0.0);
        assert_eq!(s.last_diagnostics().system_times.len(), 2);
    }

    #[test]
    fn hierarchy_systems_sweep_dirty_entities() {
        let mut s = scene();
        s.add_hierarchy_systems();
        let t = Archetype::of(ComponentKind::TRANSFORM);
        let parent = s.entity_new(t);
        let child = s.spawn_child(parent, t);
        s.component_get_mut::<Transform>(parent).translation.x = 2.0;
        s.component_get_mut::<Transform>(child).translation.x = 3.0;

        s.run_frame(1.0 / 60.0);

        assert_eq!(s.component_get::<Transform>(child).world_translation().x, 5.0);
        assert!(!s.is_dirty(parent));
        assert!(!s.is_dirty(child));
        assert_eq!(
            s.system_names(),
            vec!["hierarchy_update", "hierarchy_clear_dirty"]
        );
    }
}
