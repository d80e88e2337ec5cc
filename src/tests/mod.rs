mod runtime;

mod test_cancellation;
mod test_throttle_registry;
