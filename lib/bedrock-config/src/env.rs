use std::{collections::HashMap, env::VarError, fmt, marker::PhantomData, str::FromStr};

use async_trait::async_trait;
use bedrock_core::CancellationToken;
use bedrock_error::GenericError;

use crate::{ConfigurationError, Reader, Value};

/// A reader for a single environment variable.
///
/// Created by [`env`].
#[derive(Clone, Debug)]
pub struct Env {
    name: String,
}

/// Creates a reader for the environment variable `name`.
///
/// The variable is looked up every time the reader is read, so changes to the environment are always observed. An
/// absent variable is unset, while a variable set to the empty string is set.
pub fn env<S: Into<String>>(name: S) -> Env {
    Env { name: name.into() }
}

impl Env {
    fn lookup(&self) -> Result<Value<String>, ConfigurationError> {
        match std::env::var(&self.name) {
            Ok(value) => Ok(Value::set(value)),
            Err(VarError::NotPresent) => Ok(Value::unset()),
            Err(VarError::NotUnicode(_)) => Err(ConfigurationError::InvalidValue {
                key: self.name.clone(),
                reason: String::from("value is not valid Unicode"),
            }),
        }
    }
}

#[async_trait]
impl Reader<String> for Env {
    async fn read(&self, _ctx: &CancellationToken) -> Result<Value<String>, GenericError> {
        Ok(self.lookup()?)
    }
}

/// A reader that parses a single environment variable.
///
/// Created by [`env_parsed`].
pub struct EnvParsed<T> {
    inner: Env,
    _value: PhantomData<fn() -> T>,
}

/// Creates a reader that parses the environment variable `name` as a `T`.
///
/// An absent variable is unset. A variable that fails to parse is an error, not an unset value.
pub fn env_parsed<T, S>(name: S) -> EnvParsed<T>
where
    T: FromStr,
    S: Into<String>,
{
    EnvParsed {
        inner: env(name),
        _value: PhantomData,
    }
}

#[async_trait]
impl<T> Reader<T> for EnvParsed<T>
where
    T: FromStr + Send + 'static,
    T::Err: fmt::Display,
{
    async fn read(&self, _ctx: &CancellationToken) -> Result<Value<T>, GenericError> {
        let raw = match self.inner.lookup()?.into_option() {
            Some(raw) => raw,
            None => return Ok(Value::unset()),
        };

        match raw.parse::<T>() {
            Ok(value) => Ok(Value::set(value)),
            Err(e) => Err(ConfigurationError::InvalidValue {
                key: self.inner.name.clone(),
                reason: e.to_string(),
            }
            .into()),
        }
    }
}

/// A snapshot of the process environment.
///
/// Reading takes a fresh snapshot of every environment variable whose name and value are valid Unicode. Nothing is
/// cached between reads.
#[derive(Clone, Copy, Debug, Default)]
pub struct Environment;

#[async_trait]
impl Reader<HashMap<String, String>> for Environment {
    async fn read(&self, _ctx: &CancellationToken) -> Result<Value<HashMap<String, String>>, GenericError> {
        let vars = std::env::vars_os()
            .filter_map(|(name, value)| Some((name.into_string().ok()?, value.into_string().ok()?)))
            .collect();
        Ok(Value::set(vars))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{default_to, read};

    #[tokio::test]
    async fn env_is_read_at_read_time() {
        let ctx = CancellationToken::new();
        let name = "BEDROCK_CONFIG_TEST_ENV_READ_TIME";
        let reader = env(name);

        std::env::remove_var(name);
        assert!(!reader.read(&ctx).await.unwrap().is_set());

        std::env::set_var(name, "first");
        assert_eq!(read(&ctx, &reader).await.unwrap(), "first");

        std::env::set_var(name, "");
        assert_eq!(read(&ctx, &reader).await.unwrap(), "");

        std::env::remove_var(name);
        assert!(!reader.read(&ctx).await.unwrap().is_set());
    }

    #[tokio::test]
    async fn env_parsed_values() {
        let ctx = CancellationToken::new();
        let name = "BEDROCK_CONFIG_TEST_ENV_PARSED";

        std::env::set_var(name, "8081");
        assert_eq!(read(&ctx, &env_parsed::<u16, _>(name)).await.unwrap(), 8081);

        std::env::set_var(name, "not-a-port");
        let error = env_parsed::<u16, _>(name).read(&ctx).await.unwrap_err();
        assert!(error.to_string().contains(name));

        // Parse errors are not swallowed by a default.
        assert!(default_to(80u16, env_parsed(name)).read(&ctx).await.is_err());

        std::env::remove_var(name);
        assert_eq!(read(&ctx, &default_to(80u16, env_parsed(name))).await.unwrap(), 80);
    }

    #[tokio::test]
    async fn environment_snapshot_is_fresh() {
        let ctx = CancellationToken::new();
        let name = "BEDROCK_CONFIG_TEST_ENVIRONMENT_SNAPSHOT";

        std::env::remove_var(name);
        let before = read(&ctx, &Environment).await.unwrap();
        assert!(!before.contains_key(name));

        std::env::set_var(name, "present");
        let after = read(&ctx, &Environment).await.unwrap();
        assert_eq!(after.get(name).map(String::as_str), Some("present"));
        std::env::remove_var(name);
    }
}
