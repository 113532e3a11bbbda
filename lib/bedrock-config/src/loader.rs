use std::{marker::PhantomData, path::Path, sync::Arc};

use async_trait::async_trait;
use bedrock_core::CancellationToken;
use bedrock_error::GenericError;
use figment::{
    error::Kind,
    providers::{Env, Serialized},
    Figment, Provider as _,
};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::{provider::FileProvider, ConfigurationError, Reader, Value};

struct BoxedProvider(Box<dyn figment::Provider + Send + Sync>);

impl figment::Provider for BoxedProvider {
    fn metadata(&self) -> figment::Metadata {
        self.0.metadata()
    }

    fn data(&self) -> Result<figment::value::Map<figment::Profile, figment::value::Dict>, figment::Error> {
        self.0.data()
    }
}

/// A configuration loader that layers several sources.
///
/// Sources take precedence in the order they are added: a value from a source added later overrides the same value from
/// a source added earlier. Once all sources are added, the configuration can either be deserialized as a whole
/// ([`into_typed`][Self::into_typed]) or turned into a [`GenericConfiguration`] that hands out a [`Reader`] per key.
///
/// # Supported sources
///
/// - YAML file
/// - JSON file
/// - environment variables (must be prefixed; see [`from_environment`][Self::from_environment])
#[derive(Default)]
pub struct ConfigurationLoader {
    providers: Vec<BoxedProvider>,
}

impl ConfigurationLoader {
    /// Loads the given YAML configuration file.
    ///
    /// # Errors
    ///
    /// If the file could not be read, or if the file is not valid YAML, an error will be returned.
    pub fn from_yaml<P>(mut self, path: P) -> Result<Self, ConfigurationError>
    where
        P: AsRef<Path>,
    {
        let provider = FileProvider::from_yaml(&path)?;
        self.providers.push(BoxedProvider(Box::new(provider)));
        Ok(self)
    }

    /// Attempts to load the given YAML configuration file, ignoring any errors.
    ///
    /// Errors include the file not existing, not being readable, and not being valid YAML.
    pub fn try_from_yaml<P>(mut self, path: P) -> Self
    where
        P: AsRef<Path>,
    {
        match FileProvider::from_yaml(&path) {
            Ok(provider) => self.providers.push(BoxedProvider(Box::new(provider))),
            Err(e) => {
                debug!(error = %e, file_path = %path.as_ref().display(), "Unable to read YAML configuration file. Ignoring.")
            }
        }
        self
    }

    /// Loads the given JSON configuration file.
    ///
    /// # Errors
    ///
    /// If the file could not be read, or if the file is not valid JSON, an error will be returned.
    pub fn from_json<P>(mut self, path: P) -> Result<Self, ConfigurationError>
    where
        P: AsRef<Path>,
    {
        let provider = FileProvider::from_json(&path)?;
        self.providers.push(BoxedProvider(Box::new(provider)));
        Ok(self)
    }

    /// Attempts to load the given JSON configuration file, ignoring any errors.
    ///
    /// Errors include the file not existing, not being readable, and not being valid JSON.
    pub fn try_from_json<P>(mut self, path: P) -> Self
    where
        P: AsRef<Path>,
    {
        match FileProvider::from_json(&path) {
            Ok(provider) => self.providers.push(BoxedProvider(Box::new(provider))),
            Err(e) => {
                debug!(error = %e, file_path = %path.as_ref().display(), "Unable to read JSON configuration file. Ignoring.")
            }
        }
        self
    }

    /// Loads configuration from environment variables.
    ///
    /// The prefix given will have an underscore appended to it if it does not already end with one. For example, with a
    /// prefix of `app`, any environment variable starting with `app_` would be matched, and `APP_LISTEN_ADDRESS` is
    /// exposed as the key `listen_address`.
    ///
    /// The environment is captured when this method is called.
    ///
    /// # Errors
    ///
    /// If the prefix is empty, an error will be returned.
    pub fn from_environment(mut self, prefix: &str) -> Result<Self, ConfigurationError> {
        if prefix.is_empty() {
            return Err(ConfigurationError::EmptyPrefix);
        }

        let prefix = if prefix.ends_with('_') {
            prefix.to_string()
        } else {
            format!("{}_", prefix)
        };

        // `Env` isn't `Send + Sync`, so snapshot it into a serialized provider.
        let values = Env::prefixed(&prefix).data()?;
        if let Some(default_dict) = values.get(&figment::Profile::Default) {
            self.providers
                .push(BoxedProvider(Box::new(Serialized::defaults(default_dict.clone()))));
        }
        Ok(self)
    }

    fn into_figment(self) -> Figment {
        self.providers
            .into_iter()
            .fold(Figment::new(), |figment, provider| figment.admerge(provider))
    }

    /// Consumes the configuration loader, deserializing it as `T`.
    ///
    /// # Errors
    ///
    /// If the configuration could not be deserialized into `T`, an error will be returned.
    pub fn into_typed<T>(self) -> Result<T, ConfigurationError>
    where
        T: DeserializeOwned,
    {
        self.into_figment().extract().map_err(Into::into)
    }

    /// Consumes the configuration loader and wraps it in a generic, queryable configuration.
    pub fn into_generic(self) -> GenericConfiguration {
        GenericConfiguration {
            figment: Arc::new(self.into_figment()),
        }
    }
}

/// A generic configuration object.
///
/// This represents the merged configuration derived from [`ConfigurationLoader`] in its raw form. Values are queried
/// by key, where keys use the form `a.b.c` with periods indicating nesting. A nested key that isn't found is also tried
/// with its periods replaced by underscores, which is how nested keys appear when they come from environment
/// variables.
#[derive(Clone, Debug)]
pub struct GenericConfiguration {
    figment: Arc<Figment>,
}

impl GenericConfiguration {
    /// Gets a configuration value by key, if it exists.
    ///
    /// # Errors
    ///
    /// If the key exists but its value can't be deserialized as `T`, an error will be returned.
    pub fn try_get_typed<T>(&self, key: &str) -> Result<Option<T>, ConfigurationError>
    where
        T: DeserializeOwned,
    {
        match self.figment.extract_inner(key) {
            Ok(value) => Ok(Some(value)),
            Err(e) if is_missing(&e) => {
                let fallback_key = key.replace('.', "_");
                if fallback_key == key {
                    return Ok(None);
                }

                match self.figment.extract_inner(&fallback_key) {
                    Ok(value) => Ok(Some(value)),
                    Err(e) if is_missing(&e) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Gets a configuration value by key.
    ///
    /// # Errors
    ///
    /// If the key does not exist, or its value can't be deserialized as `T`, an error will be returned.
    pub fn get_typed<T>(&self, key: &str) -> Result<T, ConfigurationError>
    where
        T: DeserializeOwned,
    {
        self.try_get_typed(key)?.ok_or(ConfigurationError::ValueNotSet)
    }

    /// Deserializes the entire configuration as `T`.
    ///
    /// # Errors
    ///
    /// If the configuration could not be deserialized into `T`, an error will be returned.
    pub fn as_typed<T>(&self) -> Result<T, ConfigurationError>
    where
        T: DeserializeOwned,
    {
        self.figment.extract().map_err(Into::into)
    }

    /// Returns a reader for the value at `key`.
    ///
    /// A missing key reads as unset, and a value of the wrong type is a read error.
    pub fn reader<T>(&self, key: &str) -> KeyReader<T> {
        KeyReader {
            config: self.clone(),
            key: key.to_string(),
            _value: PhantomData,
        }
    }
}

fn is_missing(e: &figment::Error) -> bool {
    matches!(e.kind, Kind::MissingField(_))
}

/// A reader for a single key of a [`GenericConfiguration`].
///
/// Created by [`GenericConfiguration::reader`].
pub struct KeyReader<T> {
    config: GenericConfiguration,
    key: String,
    _value: PhantomData<fn() -> T>,
}

#[async_trait]
impl<T> Reader<T> for KeyReader<T>
where
    T: DeserializeOwned + Send + 'static,
{
    async fn read(&self, _ctx: &CancellationToken) -> Result<Value<T>, GenericError> {
        let value = self.config.try_get_typed(&self.key)?;
        Ok(value.into())
    }
}

#[cfg(test)]
mod tests {
    use std::{io::Write as _, net::SocketAddr};

    use serde::Deserialize;
    use tempfile::NamedTempFile;

    use super::*;
    use crate::{default_to, read};

    const YAML: &str = r#"
name: checkout
server:
  listen_address: "127.0.0.1:8080"
  grace_period_secs: 10
"#;

    fn write_temp(contents: &str, suffix: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn yaml_keys_as_readers() {
        let file = write_temp(YAML, ".yaml");
        let config = ConfigurationLoader::default().from_yaml(file.path()).unwrap().into_generic();
        let ctx = CancellationToken::new();

        let grace_period = config.reader::<u64>("server.grace_period_secs");
        assert_eq!(read(&ctx, &grace_period).await.unwrap(), 10);

        let address = config.reader::<SocketAddr>("server.listen_address");
        assert_eq!(read(&ctx, &address).await.unwrap().port(), 8080);

        // Missing keys are unset, so they can be defaulted.
        let missing = config.reader::<u64>("server.max_connections");
        assert!(!missing.read(&ctx).await.unwrap().is_set());
        assert_eq!(read(&ctx, &default_to(512u64, missing)).await.unwrap(), 512);

        // Type mismatches are errors, not unset values.
        let mismatched = config.reader::<u64>("name");
        assert!(mismatched.read(&ctx).await.is_err());
    }

    #[test]
    fn later_sources_take_precedence() {
        let yaml = write_temp(YAML, ".yaml");
        let json = write_temp(r#"{"server": {"grace_period_secs": 3}}"#, ".json");

        let config = ConfigurationLoader::default()
            .from_yaml(yaml.path())
            .unwrap()
            .from_json(json.path())
            .unwrap()
            .into_generic();

        assert_eq!(config.get_typed::<u64>("server.grace_period_secs").unwrap(), 3);
        assert_eq!(config.get_typed::<String>("name").unwrap(), "checkout");
    }

    #[test]
    fn environment_overrides_files() {
        std::env::set_var("BEDROCK_LOADER_TEST_NAME", "payments");
        let yaml = write_temp(YAML, ".yaml");

        let config = ConfigurationLoader::default()
            .from_yaml(yaml.path())
            .unwrap()
            .from_environment("BEDROCK_LOADER_TEST")
            .unwrap()
            .into_generic();
        std::env::remove_var("BEDROCK_LOADER_TEST_NAME");

        assert_eq!(config.get_typed::<String>("name").unwrap(), "payments");
        assert_eq!(config.get_typed::<u64>("server.grace_period_secs").unwrap(), 10);
    }

    #[test]
    fn nested_keys_fall_back_to_environment_form() {
        std::env::set_var("BEDROCK_FALLBACK_TEST_CACHE_TTL_SECS", "30");
        let config = ConfigurationLoader::default()
            .from_environment("BEDROCK_FALLBACK_TEST")
            .unwrap()
            .into_generic();
        std::env::remove_var("BEDROCK_FALLBACK_TEST_CACHE_TTL_SECS");

        assert_eq!(config.get_typed::<u64>("cache.ttl_secs").unwrap(), 30);
    }

    #[test]
    fn typed_extraction() {
        #[derive(Deserialize)]
        struct Server {
            listen_address: SocketAddr,
            grace_period_secs: u64,
        }

        #[derive(Deserialize)]
        struct Config {
            name: String,
            server: Server,
        }

        let yaml = write_temp(YAML, ".yaml");
        let config: Config = ConfigurationLoader::default().from_yaml(yaml.path()).unwrap().into_typed().unwrap();
        assert_eq!(config.name, "checkout");
        assert_eq!(config.server.listen_address.port(), 8080);
        assert_eq!(config.server.grace_period_secs, 10);
    }

    #[test]
    fn missing_files() {
        assert!(ConfigurationLoader::default().from_yaml("/nonexistent/bedrock.yaml").is_err());

        let config = ConfigurationLoader::default().try_from_json("/nonexistent/bedrock.json").into_generic();
        assert!(config.try_get_typed::<u64>("anything").unwrap().is_none());
        assert!(matches!(
            config.get_typed::<u64>("anything"),
            Err(ConfigurationError::ValueNotSet)
        ));
    }

    #[test]
    fn empty_prefix_is_rejected() {
        assert!(matches!(
            ConfigurationLoader::default().from_environment(""),
            Err(ConfigurationError::EmptyPrefix)
        ));
    }
}
