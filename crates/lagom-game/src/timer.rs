//! Countdown timers that fire a payload when they run out

use std::marker::PhantomData;

use lagom_core::Observable;
use lagom_ecs::{
    Component, ComponentContext, ComponentRef, EntityId, GlobalMatches, GlobalSystem, Scene,
};
use tracing::debug;

type TimerHook<T> = Box<dyn FnMut(&mut Scene, EntityId, &T)>;

/// Countdown in seconds, driven by [`TimerSystem`].
///
/// On expiry the timer notifies its observers and scene hooks with the
/// payload, then re-arms if repeating or removes itself from its entity.
pub struct Timer<T: Clone + 'static> {
    length: f32,
    remaining: f32,
    payload: T,
    repeat: bool,
    on_trigger: Observable<T>,
    hooks: Vec<TimerHook<T>>,
}

impl<T: Clone + 'static> Timer<T> {
    pub fn new(seconds: f32, payload: T) -> Self {
        Self {
            length: seconds,
            remaining: seconds,
            payload,
            repeat: false,
            on_trigger: Observable::new(),
            hooks: Vec::new(),
        }
    }

    pub fn repeating(seconds: f32, payload: T) -> Self {
        Self {
            repeat: true,
            ..Self::new(seconds, payload)
        }
    }

    /// Run `hook` with scene access each time the timer fires.
    pub fn on_fire(mut self, hook: impl FnMut(&mut Scene, EntityId, &T) + 'static) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    /// Observers see only the payload.
    pub fn on_trigger(&mut self) -> &mut Observable<T> {
        &mut self.on_trigger
    }

    pub fn length(&self) -> f32 {
        self.length
    }

    pub fn remaining(&self) -> f32 {
        self.remaining
    }

    pub fn is_repeating(&self) -> bool {
        self.repeat
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    /// Restart the countdown from the full length.
    pub fn reset(&mut self) {
        self.remaining = self.length;
    }
}

impl<T: Clone + 'static> Component for Timer<T> {
    fn on_removed(&mut self, _ctx: &mut ComponentContext<'_>) {
        self.on_trigger.release_all();
        self.hooks.clear();
    }
}

/// Counts down every `Timer<T>` in the scene on the variable-rate pass.
pub struct TimerSystem<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> TimerSystem<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for TimerSystem<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> TimerSystem<T> {
    fn fire(scene: &mut Scene, timer: ComponentRef) {
        let Some(state) = scene.component_mut::<Timer<T>>(timer) else {
            return;
        };
        let payload = state.payload.clone();
        let repeat = state.repeat;
        state.on_trigger.trigger(&payload);
        if repeat {
            state.reset();
        }

        let mut hooks = std::mem::take(&mut state.hooks);
        for hook in &mut hooks {
            hook(scene, timer.entity, &payload);
        }

        if repeat {
            if let Some(state) = scene.component_mut::<Timer<T>>(timer) {
                // Hooks added while firing go after the existing ones
                hooks.append(&mut state.hooks);
                state.hooks = hooks;
            }
        } else if scene.remove_component(timer.entity, timer.component).is_err() {
            debug!(entity = %timer.entity, "timer already gone when it fired");
        }
    }
}

impl<T: Clone + 'static> GlobalSystem for TimerSystem<T> {
    type Components = (Timer<T>,);

    fn update(&mut self, scene: &mut Scene, delta: f32, components: &GlobalMatches) {
        for timer in components.of::<Timer<T>>() {
            let Some(state) = scene.component_mut::<Timer<T>>(*timer) else {
                continue;
            };
            state.remaining -= delta;
            if state.remaining <= 0.0 {
                Self::fire(scene, *timer);
            }
        }
    }

    fn name(&self) -> &'static str {
        "TimerSystem"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lagom_ecs::Entity;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Spawn,
        End(u32),
    }

    fn scene_with_timers() -> Scene {
        let mut scene = Scene::new();
        scene.add_global_system(TimerSystem::<Event>::new());
        scene
    }

    #[test]
    fn one_shot_fires_once_and_removes_itself() {
        let mut scene = scene_with_timers();
        let fired = Rc::new(RefCell::new(Vec::new()));
        let log = fired.clone();
        let entity = scene.add_entity(Entity::new("round"));
        let mut timer = Timer::new(1.0, Event::End(3));
        timer.on_trigger().register(move |e: &Event| log.borrow_mut().push(e.clone()));
        scene.add_component(entity, timer).unwrap();

        scene.update(0.6);
        assert!(fired.borrow().is_empty());
        assert!((scene.get_component::<Timer<Event>>(entity).unwrap().remaining() - 0.4).abs() < 1e-6);

        scene.update(0.6);
        assert_eq!(*fired.borrow(), vec![Event::End(3)]);
        assert!(!scene.has_component::<Timer<Event>>(entity));

        scene.update(5.0);
        assert_eq!(fired.borrow().len(), 1);
        assert!(scene.is_alive(entity));
    }

    #[test]
    fn repeating_timer_rearms_and_hooks_get_the_scene() {
        let mut scene = scene_with_timers();
        let spawner = scene.add_entity(Entity::new("spawner"));
        let timer = Timer::repeating(0.5, Event::Spawn).on_fire(|scene, _, event| {
            assert_eq!(*event, Event::Spawn);
            scene.add_entity(Entity::new("spawned"));
        });
        scene.add_component(spawner, timer).unwrap();
        let before = scene.entity_count();

        for _ in 0..4 {
            scene.update(0.25);
        }
        assert_eq!(scene.entity_count(), before + 2);
        let timer = scene.get_component::<Timer<Event>>(spawner).unwrap();
        assert!(timer.is_repeating());
        assert_eq!(timer.remaining(), timer.length());
    }

    #[test]
    fn hook_can_destroy_the_owner() {
        let mut scene = scene_with_timers();
        let doomed = scene.add_entity(Entity::new("doomed"));
        let timer = Timer::repeating(0.1, Event::Spawn).on_fire(|scene, entity, _| {
            scene.destroy(entity).unwrap();
        });
        scene.add_component(doomed, timer).unwrap();

        scene.update(0.2);
        assert!(!scene.is_alive(doomed));
        scene.update(0.2);
    }

    #[test]
    fn removal_releases_observers() {
        let mut scene = scene_with_timers();
        let entity = scene.add_entity(Entity::new("t"));
        let mut timer = Timer::new(1.0, Event::Spawn);
        timer.on_trigger().register(|_| {});
        let id = scene.add_component(entity, timer).unwrap();

        let removed = scene.remove_component(entity, id).unwrap();
        let timer = removed.downcast_ref::<Timer<Event>>().unwrap();
        assert!(timer.on_trigger.is_empty());
    }
}
