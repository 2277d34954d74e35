use std::fmt;
use std::str::FromStr;

use crate::error::LoaderError;

/// Stable key used to address a video's segments and its persisted preferences.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VideoIdentity {
    /// A video addressed by its course slug and its own slug.
    Course {
        course_slug: String,
        video_slug: String,
    },
    /// Legacy addressing by the uploaded video name alone.
    Name(String),
}

impl VideoIdentity {
    pub fn course(course_slug: impl Into<String>, video_slug: impl Into<String>) -> Self {
        Self::Course {
            course_slug: course_slug.into(),
            video_slug: video_slug.into(),
        }
    }

    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    /// Path segments used when the identity is appended to an endpoint path.
    pub fn path_segments(&self) -> Vec<&str> {
        match self {
            Self::Course {
                course_slug,
                video_slug,
            } => vec![course_slug.as_str(), video_slug.as_str()],
            Self::Name(name) => vec![name.as_str()],
        }
    }

    pub fn resolution_key(&self) -> String {
        format!("{self}_resolution")
    }

    pub fn volume_key(&self) -> String {
        format!("{self}_volume")
    }
}

impl fmt::Display for VideoIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Course {
                course_slug,
                video_slug,
            } => write!(f, "{course_slug}/{video_slug}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

impl FromStr for VideoIdentity {
    type Err = LoaderError;

    /// `course/video` parses as a course video, anything without a slash as a legacy name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().trim_matches('/');
        if s.is_empty() {
            return Err(LoaderError::configuration("video identity must not be empty"));
        }

        match s.split_once('/') {
            Some((course, video)) if !course.is_empty() && !video.is_empty() => {
                if video.contains('/') {
                    return Err(LoaderError::configuration(format!(
                        "video identity `{s}` has more than two path segments"
                    )));
                }
                Ok(Self::course(course, video))
            }
            Some(_) => Err(LoaderError::configuration(format!(
                "video identity `{s}` has an empty slug"
            ))),
            None => Ok(Self::name(s)),
        }
    }
}
