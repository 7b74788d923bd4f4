//! Artifact coordinates in `group:artifact:version[:packaging[:classifier]]` form.
//!
//! A coordinate addresses one artifact in a Maven-layout repository. The
//! delivery pipeline mostly cares about three renderings of it: the textual
//! form stored in delivery records, the file name an artifact is published
//! under, and the repository-relative path used by HTTP artifact stores.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Packaging assumed when a coordinate does not name one.
pub const DEFAULT_PACKAGING: &str = "jar";

/// Errors raised while parsing a coordinate string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinateError {
    /// The string has fewer than three or more than five segments.
    #[error("coordinate {input:?} must have 3 to 5 ':'-separated segments")]
    SegmentCount {
        /// The rejected input.
        input: String,
    },

    /// One of the segments is blank.
    #[error("coordinate {input:?} has an empty {segment} segment")]
    EmptySegment {
        /// The rejected input.
        input: String,
        /// Name of the empty segment.
        segment: &'static str,
    },
}

/// A parsed artifact coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Coordinate {
    group: String,
    artifact: String,
    version: String,
    packaging: Option<String>,
    classifier: Option<String>,
}

impl Coordinate {
    /// Builds a coordinate without packaging or classifier.
    ///
    /// # Examples
    ///
    /// ```
    /// use courier_common::Coordinate;
    ///
    /// let gav = Coordinate::new("com.acme", "pkg", "1.0");
    /// assert_eq!(gav.to_string(), "com.acme:pkg:1.0");
    /// ```
    #[must_use]
    pub fn new(
        group: impl Into<String>,
        artifact: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            artifact: artifact.into(),
            version: version.into(),
            packaging: None,
            classifier: None,
        }
    }

    /// Parses the textual form of a coordinate.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinateError`] when the segment count is wrong or a
    /// mandatory segment is empty.
    pub fn parse(input: &str) -> Result<Self, CoordinateError> {
        let segments: Vec<&str> = input.trim().split(':').collect();
        let (group, artifact, version, packaging, classifier) = match segments.as_slice() {
            [g, a, v] => (*g, *a, *v, None, None),
            [g, a, v, p] => (*g, *a, *v, Some(*p), None),
            [g, a, v, p, c] => (*g, *a, *v, Some(*p), Some(*c)),
            _ => {
                return Err(CoordinateError::SegmentCount {
                    input: input.to_owned(),
                });
            }
        };

        for (segment, value) in [("group", group), ("artifact", artifact), ("version", version)] {
            if value.is_empty() {
                return Err(CoordinateError::EmptySegment {
                    input: input.to_owned(),
                    segment,
                });
            }
        }

        Ok(Self {
            group: group.to_owned(),
            artifact: artifact.to_owned(),
            version: version.to_owned(),
            packaging: packaging.filter(|p| !p.is_empty()).map(str::to_owned),
            classifier: classifier.filter(|c| !c.is_empty()).map(str::to_owned),
        })
    }

    /// Returns a copy of this coordinate with the packaging replaced.
    #[must_use]
    pub fn with_packaging(&self, packaging: &str) -> Self {
        Self {
            packaging: Some(packaging.to_owned()),
            ..self.clone()
        }
    }

    /// Group identifier, e.g. `com.example.ACME`.
    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Artifact identifier.
    #[must_use]
    pub fn artifact(&self) -> &str {
        &self.artifact
    }

    /// Version string.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Explicit packaging, if any.
    #[must_use]
    pub fn packaging(&self) -> Option<&str> {
        self.packaging.as_deref()
    }

    /// Classifier, if any.
    #[must_use]
    pub fn classifier(&self) -> Option<&str> {
        self.classifier.as_deref()
    }

    /// Code of the client owning this artifact: the last `.` segment of the group.
    ///
    /// # Examples
    ///
    /// ```
    /// use courier_common::Coordinate;
    ///
    /// let gav = Coordinate::new("com.example.ACME", "pkg", "1.0");
    /// assert_eq!(gav.client_code(), "ACME");
    /// ```
    #[must_use]
    pub fn client_code(&self) -> &str {
        self.group.rsplit('.').next().unwrap_or(&self.group)
    }

    /// File name the artifact is published under.
    ///
    /// # Examples
    ///
    /// ```
    /// use courier_common::Coordinate;
    ///
    /// let gav = Coordinate::parse("com.acme:pkg:1.0:zip").unwrap();
    /// assert_eq!(gav.filename(), "pkg-1.0.zip");
    /// ```
    #[must_use]
    pub fn filename(&self) -> String {
        let packaging = self.packaging().unwrap_or(DEFAULT_PACKAGING);
        match self.classifier() {
            Some(classifier) => format!(
                "{}-{}-{classifier}.{packaging}",
                self.artifact, self.version
            ),
            None => format!("{}-{}.{packaging}", self.artifact, self.version),
        }
    }

    /// Path of the artifact inside a Maven-layout repository.
    #[must_use]
    pub fn repository_path(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.group.replace('.', "/"),
            self.artifact,
            self.version,
            self.filename()
        )
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.artifact, self.version)?;
        match (&self.packaging, &self.classifier) {
            (Some(p), Some(c)) => write!(f, ":{p}:{c}"),
            (Some(p), None) => write!(f, ":{p}"),
            (None, Some(c)) => write!(f, ":{DEFAULT_PACKAGING}:{c}"),
            (None, None) => Ok(()),
        }
    }
}

impl FromStr for Coordinate {
    type Err = CoordinateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Coordinate {
    type Error = CoordinateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Coordinate> for String {
    fn from(value: Coordinate) -> Self {
        value.to_string()
    }
}
