//! # Configuration Resolver / 配置解析器
//!
//! Turns a [`ConfigRequest`] into a fully specified [`TestConfig`]. Every axis
//! the request leaves open is drawn uniformly from its catalog; explicit axes
//! pass through unchanged, even if the catalog does not list them.
//!
//! 将 [`ConfigRequest`] 转换为完全指定的 [`TestConfig`]。请求中未指定的维度
//! 从其目录中均匀随机抽取；已指定的维度原样保留。

use rand::Rng;
use rand::seq::SliceRandom;

use crate::core::config::AxisCatalog;
use crate::core::error::CiError;
use crate::core::models::{ConfigRequest, OsChoice, TestConfig};

/// Resolves one matrix cell. Each call makes a fresh draw from `rng`.
pub fn resolve<R: Rng + ?Sized>(
    request: &ConfigRequest,
    catalog: &AxisCatalog,
    rng: &mut R,
) -> Result<TestConfig, CiError> {
    let isabelle = match &request.isabelle {
        Some(version) => version.clone(),
        None => pick("isabelle", &catalog.isabelle, rng)?.clone(),
    };
    let java = match request.java {
        Some(version) => version,
        None => *pick("java", &catalog.java, rng)?,
    };
    let os = match &request.os {
        OsChoice::Local => None,
        OsChoice::Fixed(os) => Some(os.clone()),
        OsChoice::Any => Some(pick("os", &catalog.os, rng)?.clone()),
    };
    Ok(TestConfig { isabelle, java, os })
}

fn pick<'a, T, R: Rng + ?Sized>(
    axis: &'static str,
    values: &'a [T],
    rng: &mut R,
) -> Result<&'a T, CiError> {
    values.choose(rng).ok_or(CiError::EmptyCatalog { axis })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn empty_catalog_only_fails_for_open_axes() {
        let catalog = AxisCatalog {
            isabelle: vec![],
            java: vec![17],
            os: vec![],
        };
        let mut rng = StdRng::seed_from_u64(7);

        let pinned = ConfigRequest {
            isabelle: Some("2024".to_string()),
            java: None,
            os: OsChoice::Local,
        };
        let config = resolve(&pinned, &catalog, &mut rng).unwrap();
        assert_eq!(config.isabelle, "2024");
        assert_eq!(config.java, 17);

        let open = ConfigRequest::default();
        let err = resolve(&open, &catalog, &mut rng).unwrap_err();
        assert!(matches!(err, CiError::EmptyCatalog { axis: "isabelle" }));
    }
}
