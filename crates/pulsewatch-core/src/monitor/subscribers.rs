//! Triggers subscribed to a monitor

use crate::models::TriggerSpec;

/// Ordered set of triggers keyed by trigger name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subscribers {
    triggers: Vec<TriggerSpec>,
}

impl Subscribers {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a trigger, replacing one with the same name in place
    pub fn add(&mut self, trigger: TriggerSpec) {
        match self.triggers.iter_mut().find(|t| t.name == trigger.name) {
            Some(existing) => *existing = trigger,
            None => self.triggers.push(trigger),
        }
    }

    /// Remove the trigger called `name`
    pub fn remove(&mut self, name: &str) -> Option<TriggerSpec> {
        let index = self.triggers.iter().position(|t| t.name == name)?;
        Some(self.triggers.remove(index))
    }

    /// Whether a trigger called `name` is subscribed
    pub fn contains(&self, name: &str) -> bool {
        self.triggers.iter().any(|t| t.name == name)
    }

    /// Triggers in subscription order
    pub fn iter(&self) -> impl Iterator<Item = &TriggerSpec> {
        self.triggers.iter()
    }

    /// Number of triggers
    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    /// Whether no trigger is subscribed
    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigger(name: &str, operand: &str) -> TriggerSpec {
        TriggerSpec {
            name: name.into(),
            notification: "alert1".into(),
            field_path: "value".into(),
            op: "gt".into(),
            operand: operand.into(),
        }
    }

    #[test]
    fn test_add_replaces_in_place() {
        let mut subscribers = Subscribers::new();
        subscribers.add(trigger("a", "1"));
        subscribers.add(trigger("b", "2"));
        subscribers.add(trigger("a", "9"));

        let names: Vec<&str> = subscribers.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(subscribers.iter().next().unwrap().operand, "9");
    }

    #[test]
    fn test_remove() {
        let mut subscribers = Subscribers::new();
        subscribers.add(trigger("a", "1"));

        assert!(subscribers.contains("a"));
        assert_eq!(subscribers.remove("a").map(|t| t.name), Some("a".to_string()));
        assert!(subscribers.remove("a").is_none());
        assert!(subscribers.is_empty());
    }
}
