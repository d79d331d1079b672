use serde::de::DeserializeOwned;
use thiserror::Error;

/// A JSON decode failure with the path of the offending value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", describe(.path, .message))]
pub struct JsonDecodeError {
    pub path: String,
    pub message: String,
}

fn describe(path: &str, message: &str) -> String {
    if path.is_empty() || path == "." {
        message.to_string()
    } else {
        format!("at {path}: {message}")
    }
}

pub fn decode_json<T: DeserializeOwned>(raw: &str) -> Result<T, JsonDecodeError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize::<_, T>(&mut deserializer).map_err(|error| {
        let path = error.path().to_string();
        JsonDecodeError {
            path,
            message: error.into_inner().to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize)]
    #[allow(dead_code)]
    struct Outer {
        inner: Vec<Inner>,
    }

    #[derive(Debug, Deserialize)]
    #[allow(dead_code)]
    struct Inner {
        count: u32,
    }

    #[test]
    fn error_reports_failing_path() {
        let error = decode_json::<Outer>(r#"{"inner":[{"count":1},{"count":"x"}]}"#)
            .expect_err("bad count");
        assert_eq!(error.path, "inner[1].count");
        assert!(error.to_string().starts_with("at inner[1].count: "));
    }
}
