/// `DatapipeBus` — the publish/subscribe channel binding the core to its
/// external collaborators (display state owner, call state owner, the UI
/// compositor, the settings store, ...).
///
/// A [`Datapipe<T>`] holds the last published value of type `T`. Two kinds
/// of subscriber are supported, run in registration order:
///
/// - **filter** callbacks run before the value is cached and may rewrite
///   it (e.g. clamping an out-of-range setting);
/// - **output** callbacks run after caching and observe the final value.
///
/// Publishing synchronously and recursively delivers to every subscriber
/// before `publish` returns, matching the ordering guarantees of §5:
/// "Datapipe publish from inside a handler delivers to subscribers
/// synchronously, recursively, and before control returns."
use std::fmt;

type FilterFn<T> = Box<dyn FnMut(T) -> T>;
type OutputFn<T> = Box<dyn FnMut(&T)>;

pub struct Datapipe<T: Clone> {
    name: &'static str,
    cached: Option<T>,
    filters: Vec<FilterFn<T>>,
    outputs: Vec<OutputFn<T>>,
}

impl<T: Clone> fmt::Debug for Datapipe<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Datapipe")
            .field("name", &self.name)
            .field("has_cached", &self.cached.is_some())
            .field("filters", &self.filters.len())
            .field("outputs", &self.outputs.len())
            .finish()
    }
}

/// Publish options: whether the result should update the cache, and
/// whether filter callbacks should run at all (some publishers push a
/// value that has already been filtered upstream).
#[derive(Debug, Clone, Copy)]
pub struct PublishOpts {
    pub cache: bool,
    pub run_filters: bool,
}

impl Default for PublishOpts {
    fn default() -> Self {
        Self {
            cache: true,
            run_filters: true,
        }
    }
}

impl<T: Clone> Datapipe<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            cached: None,
            filters: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn add_filter(&mut self, f: impl FnMut(T) -> T + 'static) {
        self.filters.push(Box::new(f));
    }

    pub fn add_output(&mut self, f: impl FnMut(&T) + 'static) {
        self.outputs.push(Box::new(f));
    }

    pub fn cached(&self) -> Option<&T> {
        self.cached.as_ref()
    }

    /// Publish a value with default options (filtered, cached).
    pub fn publish(&mut self, value: T) -> T {
        self.publish_with(value, PublishOpts::default())
    }

    pub fn publish_with(&mut self, mut value: T, opts: PublishOpts) -> T {
        if opts.run_filters {
            for filter in &mut self.filters {
                value = filter(value);
            }
        }
        if opts.cache {
            self.cached = Some(value.clone());
        }
        for output in &mut self.outputs {
            output(&value);
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn filters_run_before_caching_in_order() {
        let mut pipe: Datapipe<i32> = Datapipe::new("test");
        pipe.add_filter(|v| v + 1);
        pipe.add_filter(|v| v * 2);
        let result = pipe.publish(5);
        // (5 + 1) * 2 = 12
        assert_eq!(result, 12);
        assert_eq!(pipe.cached(), Some(&12));
    }

    #[test]
    fn outputs_observe_final_cached_value() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut pipe: Datapipe<i32> = Datapipe::new("test");
        pipe.add_filter(|v| v + 1);
        let seen_cb = seen.clone();
        pipe.add_output(move |v| seen_cb.borrow_mut().push(*v));
        pipe.publish(10);
        pipe.publish(20);
        assert_eq!(*seen.borrow(), vec![11, 21]);
    }

    #[test]
    fn no_cache_leaves_previous_value() {
        let mut pipe: Datapipe<i32> = Datapipe::new("test");
        pipe.publish(1);
        pipe.publish_with(
            99,
            PublishOpts {
                cache: false,
                run_filters: true,
            },
        );
        assert_eq!(pipe.cached(), Some(&1));
    }

    #[test]
    fn skip_filters_passes_value_through_untouched() {
        let mut pipe: Datapipe<i32> = Datapipe::new("test");
        pipe.add_filter(|v| v * 100);
        let result = pipe.publish_with(
            7,
            PublishOpts {
                cache: true,
                run_filters: false,
            },
        );
        assert_eq!(result, 7);
    }

    #[test]
    fn recursive_publish_from_output_completes_before_outer_returns() {
        // A subscriber that publishes to a second pipe from inside its
        // output callback must see that nested publish settle before the
        // outer publish call returns.
        let log = Rc::new(RefCell::new(Vec::new()));
        let inner: Rc<RefCell<Datapipe<i32>>> = Rc::new(RefCell::new(Datapipe::new("inner")));
        {
            let log_cb = log.clone();
            inner.borrow_mut().add_output(move |v| log_cb.borrow_mut().push(*v));
        }

        let mut outer: Datapipe<i32> = Datapipe::new("outer");
        let inner_cb = inner.clone();
        let log_cb = log.clone();
        outer.add_output(move |v| {
            log_cb.borrow_mut().push(*v * -1);
            inner_cb.borrow_mut().publish(*v + 1);
        });

        outer.publish(1);
        assert_eq!(*log.borrow(), vec![-1, 2]);
    }
}
