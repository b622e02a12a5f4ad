use std::fmt;

/// Reads one attribute of the decision-maker for an alternative.
pub type Accessor<O> = fn(&O, usize) -> f64;

/// Static registry of named accessors on a decision-maker type `O`.
///
/// Expressions reach them as `@name` (current alternative) or `@@name`
/// (alternative 0).
pub struct ObjectAccessors<O> {
    names: Vec<String>,
    accessors: Vec<Accessor<O>>,
}

impl<O> ObjectAccessors<O> {
    pub fn new() -> Self {
        Self {
            names: Vec::new(),
            accessors: Vec::new(),
        }
    }

    /// Register `name`, replacing an earlier accessor with the same name.
    pub fn register(&mut self, name: &str, accessor: Accessor<O>) -> usize {
        if let Some(i) = self.index_of(name) {
            self.accessors[i] = accessor;
            return i;
        }
        self.names.push(name.to_string());
        self.accessors.push(accessor);
        self.accessors.len() - 1
    }

    pub fn with(mut self, name: &str, accessor: Accessor<O>) -> Self {
        self.register(name, accessor);
        self
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn call(&self, index: usize, object: &O, alternative: usize) -> Option<f64> {
        self.accessors.get(index).map(|f| f(object, alternative))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.accessors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accessors.is_empty()
    }
}

impl<O> Default for ObjectAccessors<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O> Clone for ObjectAccessors<O> {
    fn clone(&self) -> Self {
        Self {
            names: self.names.clone(),
            accessors: self.accessors.clone(),
        }
    }
}

impl<O> fmt::Debug for ObjectAccessors<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectAccessors")
            .field("names", &self.names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Person {
        age: f64,
        tours: [f64; 3],
    }

    #[test]
    fn test_register_and_call() {
        let accessors = ObjectAccessors::<Person>::new()
            .with("age", |p, _| p.age)
            .with("tours", |p, alt| p.tours[alt]);
        let person = Person {
            age: 42.0,
            tours: [1.0, 2.0, 3.0],
        };

        let tours = accessors.index_of("tours").unwrap();
        assert_eq!(accessors.call(tours, &person, 2), Some(3.0));
        assert_eq!(accessors.call(0, &person, 0), Some(42.0));
        assert_eq!(accessors.call(9, &person, 0), None);
        assert_eq!(accessors.names().collect::<Vec<_>>(), vec!["age", "tours"]);
    }

    #[test]
    fn test_register_replaces() {
        let mut accessors = ObjectAccessors::<f64>::new();
        accessors.register("v", |x, _| *x);
        let i = accessors.register("v", |x, _| *x * 2.0);
        assert_eq!(i, 0);
        assert_eq!(accessors.len(), 1);
        assert_eq!(accessors.call(0, &3.0, 0), Some(6.0));
    }
}
