//! Parameter space - the Cartesian product of independently defined dimensions.

use std::sync::Arc;

use crate::configuration::Configuration;
use crate::value::Value;

/// One axis of a parameter space.
#[derive(Debug, Clone)]
pub enum Dimension {
    /// A single parameter taking each of the listed values in turn.
    Discrete {
        /// Parameter name
        name: String,
        /// Values in iteration order
        values: Vec<Value>,
    },
    /// Several parameters that always vary together. Each bundle is merged
    /// into the configuration as a whole.
    Bundle {
        /// Dimension name, used only for display
        name: String,
        /// Parameter groups in iteration order
        bundles: Vec<Configuration>,
    },
}

impl Dimension {
    /// A single-parameter dimension.
    pub fn discrete<I, V>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Dimension::Discrete {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// A dimension whose points set several parameters at once.
    pub fn bundle(
        name: impl Into<String>,
        bundles: impl IntoIterator<Item = Configuration>,
    ) -> Self {
        Dimension::Bundle {
            name: name.into(),
            bundles: bundles.into_iter().collect(),
        }
    }

    /// Dimension name.
    pub fn name(&self) -> &str {
        match self {
            Dimension::Discrete { name, .. } | Dimension::Bundle { name, .. } => name,
        }
    }

    /// Number of points along this dimension.
    pub fn len(&self) -> usize {
        match self {
            Dimension::Discrete { values, .. } => values.len(),
            Dimension::Bundle { bundles, .. } => bundles.len(),
        }
    }

    /// Whether the dimension has no points (and so the space is empty).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn apply(&self, index: usize, config: &mut Configuration) {
        match self {
            Dimension::Discrete { name, values } => {
                config.insert(name.clone(), values[index].clone());
            }
            Dimension::Bundle { bundles, .. } => {
                for (key, value) in bundles[index].iter() {
                    config.insert(key.clone(), value.clone());
                }
            }
        }
    }
}

/// Predicate deciding whether a point of the space is kept.
pub type Constraint = Arc<dyn Fn(&Configuration) -> bool + Send + Sync>;

/// A finite, restartable sequence of configurations.
#[derive(Clone, Default)]
pub struct ParameterSpace {
    dimensions: Vec<Dimension>,
    constraints: Vec<Constraint>,
}

impl ParameterSpace {
    /// Create a space over the given dimensions.
    pub fn new(dimensions: impl IntoIterator<Item = Dimension>) -> Self {
        Self {
            dimensions: dimensions.into_iter().collect(),
            constraints: Vec::new(),
        }
    }

    /// Add a dimension.
    pub fn with_dimension(mut self, dimension: Dimension) -> Self {
        self.dimensions.push(dimension);
        self
    }

    /// Skip every point for which `constraint` returns false.
    pub fn with_constraint<F>(mut self, constraint: F) -> Self
    where
        F: Fn(&Configuration) -> bool + Send + Sync + 'static,
    {
        self.constraints.push(Arc::new(constraint));
        self
    }

    /// The dimensions of this space.
    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    /// Upper bound on the number of configurations (constraints not applied).
    pub fn estimated_size(&self) -> usize {
        self.dimensions.iter().map(Dimension::len).product()
    }

    /// Enumerate the configurations, last dimension varying fastest.
    ///
    /// A space without dimensions yields exactly one empty configuration.
    pub fn iter(&self) -> ParameterSpaceIter<'_> {
        let cursor = if self.dimensions.iter().any(Dimension::is_empty) {
            None
        } else {
            Some(vec![0; self.dimensions.len()])
        };
        ParameterSpaceIter { space: self, cursor }
    }
}

impl std::fmt::Debug for ParameterSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParameterSpace")
            .field("dimensions", &self.dimensions)
            .field("constraints", &self.constraints.len())
            .finish()
    }
}

impl<'a> IntoIterator for &'a ParameterSpace {
    type Item = Configuration;
    type IntoIter = ParameterSpaceIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Lazy iterator over a [`ParameterSpace`].
pub struct ParameterSpaceIter<'a> {
    space: &'a ParameterSpace,
    cursor: Option<Vec<usize>>,
}

impl ParameterSpaceIter<'_> {
    fn advance(&mut self) {
        let Some(indices) = self.cursor.as_mut() else {
            return;
        };
        for pos in (0..indices.len()).rev() {
            indices[pos] += 1;
            if indices[pos] < self.space.dimensions[pos].len() {
                return;
            }
            indices[pos] = 0;
        }
        // Every position wrapped around
        self.cursor = None;
    }
}

impl Iterator for ParameterSpaceIter<'_> {
    type Item = Configuration;

    fn next(&mut self) -> Option<Configuration> {
        loop {
            let indices = self.cursor.clone()?;
            self.advance();

            let mut config = Configuration::new();
            for (dimension, index) in self.space.dimensions.iter().zip(indices) {
                dimension.apply(index, &mut config);
            }

            if self.space.constraints.iter().all(|keep| keep(&config)) {
                return Some(config);
            }
        }
    }
}
