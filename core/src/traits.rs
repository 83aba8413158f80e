/// A Mealy machine: `(State, Event) → (State, Vec<Command>)`.
///
/// The client session and its sub-machines (`Handshake`, `Outbox`) all
/// implement this trait with the same associated types, so each can be
/// driven and tested on its own and composed inside `Session`.
pub trait MealyMachine: Sized {
    type Event;
    type Command;
    fn transition(self, event: Self::Event) -> (Self, Vec<Self::Command>);
}
