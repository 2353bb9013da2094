use serde::Deserialize;

use crate::plugins::CrudOptions;

pub const CONFIG_ENV: &str = "DOC_CRUD_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "./config.json";

#[derive(Deserialize, Debug, Clone)]
pub struct EndpointConfig
{
    pub rest: u16,
}

#[derive(Deserialize, Debug, Clone)]
pub struct StoreConfig
{
    /// Backend: "mem", "rocks" or "mongo".
    pub name: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default = "default_dbname")]
    pub dbname: String,
    #[serde(default)]
    pub dbpath: String,
}

fn default_dbname() -> String
{
    "doc_crud".to_string()
}

#[derive(Deserialize, Debug, Clone)]
pub struct ServiceConfig
{
    pub serve: EndpointConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub crud: CrudOptions,
}

pub fn config_path() -> std::path::PathBuf
{
    match std::env::var_os(CONFIG_ENV) {
        Some(path) => std::path::PathBuf::from(path),
        None => std::path::PathBuf::from(DEFAULT_CONFIG_PATH),
    }
}

pub fn get_config_str() -> std::io::Result<String>
{
    let configfile = config_path();
    match std::fs::read_to_string(&configfile) {
        Ok(config_str) => Ok(config_str),
        Err(e) => Err(std::io::Error::new(
                e.kind(),
                std::format!("failed to read config file {}, err: {}",
                             configfile.display(), e))),
    }
}

pub fn parse_config(config_str: &str) -> std::io::Result<ServiceConfig>
{
    serde_json::from_str(config_str).map_err(|e| std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            std::format!("parsing json config failed, err: {}", e)))
}

pub fn read_and_parse_config() -> std::io::Result<ServiceConfig>
{
    parse_config(&get_config_str()?)
}
