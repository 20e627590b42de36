//! Session cookie captured at login.

use std::fmt;

/// An authenticated session: the `name=value` cookie pair issued by the
/// login endpoint. Never refreshed or expired client-side.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    cookie: String,
}

impl Session {
    /// Build a session from a raw `Set-Cookie` header value.
    ///
    /// Keeps everything up to the first `;` (dropping `Path`, `HttpOnly` and
    /// other attributes). Returns `None` if that leaves nothing.
    ///
    /// ```
    /// use vision_rest_client::Session;
    ///
    /// let session = Session::from_set_cookie("JSESSIONID=abc123; Path=/").unwrap();
    /// assert_eq!(session.cookie(), "JSESSIONID=abc123");
    /// ```
    #[must_use]
    pub fn from_set_cookie(header: &str) -> Option<Self> {
        let pair = header.split(';').next().unwrap_or_default().trim();
        if pair.is_empty() {
            return None;
        }
        Some(Self {
            cookie: pair.to_string(),
        })
    }

    /// Value for the `Cookie` request header.
    #[must_use]
    pub fn cookie(&self) -> &str {
        &self.cookie
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.cookie.split('=').next().unwrap_or_default();
        f.debug_struct("Session")
            .field("cookie", &format_args!("{name}=<redacted>"))
            .finish()
    }
}
