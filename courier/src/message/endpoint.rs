/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::common::AppConfig;

const SCHEME: &str = "app://";

/// Address of a message sender or recipient.
///
/// Every segment is optional. An endpoint naming only an `app_id` targets any
/// running instance of that application; adding `app_instance_id` pins a single
/// instance. `endpoint_id` names a logical endpoint inside the instance and is
/// informational for routing.
///
/// Endpoints render as `app://<app_id>/<app_instance_id>/<endpoint_id>` with
/// trailing empty segments omitted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    /// Application name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    /// Running instance of the application.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_instance_id: Option<String>,
    /// Logical endpoint within the instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_id: Option<String>,
}

impl Endpoint {
    /// Targets any instance of `app_id`.
    #[must_use]
    pub fn app(app_id: impl Into<String>) -> Self {
        Self {
            app_id: Some(app_id.into()),
            ..Self::default()
        }
    }

    /// Targets one instance of `app_id`.
    #[must_use]
    pub fn instance(app_id: impl Into<String>, app_instance_id: impl Into<String>) -> Self {
        Self {
            app_id: Some(app_id.into()),
            app_instance_id: Some(app_instance_id.into()),
            endpoint_id: None,
        }
    }

    /// Sets the logical endpoint id.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint_id: impl Into<String>) -> Self {
        self.endpoint_id = Some(endpoint_id.into());
        self
    }

    /// Returns `true` if no segment is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.app_id.is_none() && self.app_instance_id.is_none() && self.endpoint_id.is_none()
    }

    /// Returns `true` if a message addressed here reaches the given instance.
    #[must_use]
    pub fn targets(&self, identity: &AppIdentity) -> bool {
        self.app_id
            .as_deref()
            .map_or(true, |app| app == identity.app_id)
            && self
                .app_instance_id
                .as_deref()
                .map_or(true, |instance| instance == identity.app_instance_id)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let segments = [
            self.app_id.as_deref().unwrap_or_default(),
            self.app_instance_id.as_deref().unwrap_or_default(),
            self.endpoint_id.as_deref().unwrap_or_default(),
        ];
        let used = segments
            .iter()
            .rposition(|segment| !segment.is_empty())
            .map_or(0, |last| last + 1);
        write!(f, "{SCHEME}{}", segments[..used].join("/"))
    }
}

/// Error returned when an endpoint string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointParseError(String);

impl fmt::Display for EndpointParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid endpoint: {}", self.0)
    }
}

impl std::error::Error for EndpointParseError {}

impl FromStr for Endpoint {
    type Err = EndpointParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix(SCHEME)
            .ok_or_else(|| EndpointParseError(format!("{s} (expected {SCHEME} scheme)")))?;
        if rest.is_empty() {
            return Ok(Self::default());
        }

        let segments: Vec<&str> = rest.split('/').collect();
        if segments.len() > 3 {
            return Err(EndpointParseError(format!("{s} (too many segments)")));
        }
        let segment = |index: usize| {
            segments
                .get(index)
                .filter(|value| !value.is_empty())
                .map(|value| (*value).to_string())
        };

        Ok(Self {
            app_id: segment(0),
            app_instance_id: segment(1),
            endpoint_id: segment(2),
        })
    }
}

/// Identity of the running application instance.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AppIdentity {
    /// Application name shared by all instances.
    pub app_id: String,
    /// Unique id of this instance.
    pub app_instance_id: String,
}

impl AppIdentity {
    /// Creates an identity from explicit ids.
    #[must_use]
    pub fn new(app_id: impl Into<String>, app_instance_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            app_instance_id: app_instance_id.into(),
        }
    }

    /// Creates an identity with a generated, time-ordered instance id.
    #[must_use]
    pub fn generate(app_id: impl Into<String>) -> Self {
        use mti::prelude::*;
        Self::new(app_id, "inst".create_type_id::<V7>().to_string())
    }

    /// Creates the identity described by the `[app]` configuration section.
    ///
    /// A configured `app_instance_id` is used as is; otherwise one is generated.
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        match &config.app_instance_id {
            Some(app_instance_id) => Self::new(config.app_id.clone(), app_instance_id.clone()),
            None => Self::generate(config.app_id.clone()),
        }
    }

    /// The endpoint addressing exactly this instance.
    #[must_use]
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::instance(self.app_id.clone(), self.app_instance_id.clone())
    }
}

impl fmt::Display for AppIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.app_id, self.app_instance_id)
    }
}
