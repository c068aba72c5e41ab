use std::cell::{Cell, RefCell};

thread_local! {
    static ACTIONS: RefCell<Vec<Action>> = const { RefCell::new(Vec::new()) };
    static NEXT_ID: Cell<u64> = const { Cell::new(0) };
}

/// Something that happened to a [`Tracked`] value.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[expect(
    clippy::exhaustive_enums,
    reason = "private test helper, no compatibility promises"
)]
pub enum Action {
    /// A value with this identity was created via [`Tracked::new()`].
    Constructed(u64),

    /// A value with identity `to` was created by cloning the value with identity `from`.
    Cloned {
        /// Identity of the value that was cloned.
        from: u64,

        /// Identity of the newly created clone.
        to: u64,
    },

    /// The value with this identity was dropped.
    Dropped(u64),
}

/// Tallies of the actions in the log, for tests that only care about counts.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[expect(
    clippy::exhaustive_structs,
    reason = "private test helper, no compatibility promises"
)]
pub struct ActionCounts {
    /// Number of [`Action::Constructed`] entries.
    pub constructed: usize,

    /// Number of [`Action::Cloned`] entries.
    pub cloned: usize,

    /// Number of [`Action::Dropped`] entries.
    pub dropped: usize,
}

impl ActionCounts {
    /// Values created but not yet dropped, per the log.
    #[must_use]
    pub fn live(&self) -> usize {
        self.constructed
            .saturating_add(self.cloned)
            .saturating_sub(self.dropped)
    }
}

/// A value that logs its own lifecycle to a thread-local action log.
///
/// Every instance has an identity that is unique on the current thread, so the log shows
/// exactly which value was cloned or dropped. Rust moves are not observable and are therefore
/// never logged: if a container moved a value into place, the log only shows the original
/// construction.
///
/// # Example
///
/// ```rust
/// use testing::{Action, Tracked, take_actions};
///
/// drop(take_actions());
///
/// let original = Tracked::new(5);
/// let id = original.id();
/// let copy = original.clone();
/// drop(original);
///
/// assert_eq!(
///     take_actions(),
///     vec![
///         Action::Constructed(id),
///         Action::Cloned { from: id, to: copy.id() },
///         Action::Dropped(id),
///     ]
/// );
/// assert_eq!(copy.value(), 5);
/// ```
#[derive(Debug)]
pub struct Tracked {
    id: u64,
    value: i64,
}

impl Tracked {
    /// Creates a new value and logs [`Action::Constructed`].
    #[must_use]
    pub fn new(value: i64) -> Self {
        let id = next_id();
        record(Action::Constructed(id));

        Self { id, value }
    }

    /// The identity of this instance.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The payload.
    #[must_use]
    pub fn value(&self) -> i64 {
        self.value
    }
}

impl Clone for Tracked {
    fn clone(&self) -> Self {
        let id = next_id();
        record(Action::Cloned { from: self.id, to: id });

        Self {
            id,
            value: self.value,
        }
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        record(Action::Dropped(self.id));
    }
}

impl PartialEq for Tracked {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for Tracked {}

/// Removes and returns every action logged on the current thread so far.
pub fn take_actions() -> Vec<Action> {
    ACTIONS.with_borrow_mut(std::mem::take)
}

/// Removes every action logged on the current thread so far and returns their tallies.
pub fn take_action_counts() -> ActionCounts {
    take_actions()
        .into_iter()
        .fold(ActionCounts::default(), |mut counts, action| {
            match action {
                Action::Constructed(_) => counts.constructed = counts.constructed.saturating_add(1),
                Action::Cloned { .. } => counts.cloned = counts.cloned.saturating_add(1),
                Action::Dropped(_) => counts.dropped = counts.dropped.saturating_add(1),
            }

            counts
        })
}

fn record(action: Action) {
    ACTIONS.with_borrow_mut(|actions| actions.push(action));
}

fn next_id() -> u64 {
    NEXT_ID.with(|next| {
        let id = next.get();
        next.set(id.wrapping_add(1));
        id
    })
}
