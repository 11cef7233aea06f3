use fail::FailScenario;

/// Activates a set of failpoints for the duration of one test.
///
/// The guard remembers which points it configured and removes exactly those
/// again when it drops, so a panicking test cannot leak an active failpoint
/// into the next one.
pub struct FaultGuard<'a> {
    _scenario: FailScenario<'a>,
    names: Vec<&'static str>,
}

impl<'a> FaultGuard<'a> {
    /// Configures every `(name, action)` pair and returns the active guard.
    pub fn inject(points: &[(&'static str, &str)]) -> Self {
        let scenario = FailScenario::setup();

        let mut names = Vec::with_capacity(points.len());
        for &(name, action) in points {
            fail::cfg(name, action).unwrap();
            names.push(name);
        }

        Self {
            _scenario: scenario,
            names,
        }
    }

    /// Deactivates the injected faults early, before the test asserts on the
    /// recovered state.
    pub fn clear(self) {}
}

impl Drop for FaultGuard<'_> {
    fn drop(&mut self) {
        for name in &self.names {
            fail::remove(name);
        }
    }
}
