use {
    anyhow::{Error, anyhow, bail, ensure},
    base64::{Engine, display::Base64Display, prelude::BASE64_URL_SAFE_NO_PAD},
    rand::{
        TryRngCore,
        distr::{Alphanumeric, SampleString},
        rand_core,
        rngs::OsRng,
    },
    serde::{Deserialize, Deserializer, Serialize, Serializer, de},
    std::{
        any::Any,
        borrow::Cow,
        fmt::{self, Debug, Display},
        panic::catch_unwind,
        str::FromStr,
    },
};

/// Bearer token presented to the storage endpoint and the catalog.
#[derive(Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccessToken(String);

const ACCESS_TOKEN_LENGTH: usize = 64;

fn format_panic_message(err: &(dyn Any + Send + 'static)) -> String {
    err.downcast_ref::<&'static str>()
        .map(|&s| s.to_owned())
        .or_else(|| err.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| format!("{err:?}"))
}

impl AccessToken {
    #[inline]
    pub fn generate() -> anyhow::Result<Self> {
        catch_unwind(|| {
            Self(Alphanumeric.sample_string(&mut rand_core::UnwrapErr(OsRng), ACCESS_TOKEN_LENGTH))
        })
        .map_err(|err| anyhow!(format_panic_message(&*err)))
    }

    #[must_use]
    #[inline]
    pub fn as_unmasked_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for AccessToken {
    type Err = Error;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ensure!(
            s.len() == ACCESS_TOKEN_LENGTH,
            "invalid access token length; got {}, expected {ACCESS_TOKEN_LENGTH}",
            s.len(),
        );
        if let Some(c) = s.chars().find(|c| !c.is_ascii_alphanumeric()) {
            bail!("access token must be alphanumeric but contains `{c}`");
        }
        Ok(Self(s.to_owned()))
    }
}

impl TryFrom<String> for AccessToken {
    type Error = Error;

    #[inline]
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AccessToken> for String {
    #[inline]
    fn from(value: AccessToken) -> Self {
        value.0
    }
}

impl Debug for AccessToken {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken").finish()
    }
}

/// Account-level secret that per-object encryption keys are derived from.
///
/// The secret itself never leaves the client. All clients of an account
/// must share it, otherwise they cannot decrypt each other's uploads.
#[derive(Clone)]
pub struct SharedSecret(Vec<u8>);

const GENERATED_SECRET_LENGTH: usize = 64;

impl SharedSecret {
    #[inline]
    pub fn generate() -> anyhow::Result<Self> {
        let mut bytes = vec![0; GENERATED_SECRET_LENGTH];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|err| anyhow!("failed to generate shared secret: {err}"))?;
        Ok(Self(bytes))
    }

    #[must_use]
    #[inline]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    #[must_use]
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    #[inline]
    pub fn display_unmasked(&self) -> impl Display + '_ {
        Base64Display::new(&self.0, &BASE64_URL_SAFE_NO_PAD)
    }
}

impl<'de> Deserialize<'de> for SharedSecret {
    #[inline]
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Cow::<'_, str>::deserialize(deserializer)?
            .parse()
            .map_err(de::Error::custom)
    }
}

impl Serialize for SharedSecret {
    #[inline]
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        BASE64_URL_SAFE_NO_PAD.encode(&self.0).serialize(serializer)
    }
}

impl FromStr for SharedSecret {
    type Err = Error;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(BASE64_URL_SAFE_NO_PAD.decode(s.trim())?))
    }
}

impl Debug for SharedSecret {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedSecret").finish_non_exhaustive()
    }
}
