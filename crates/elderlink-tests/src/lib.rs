//! End-to-end helpers: an in-process mock relay and a fully wired elder
//! daemon talking to it over a real WebSocket.

pub mod harness;

/// Extract a string value from nested JSON path.
pub fn extract_str(data: &Option<serde_json::Value>, path: &[&str]) -> String {
    let mut v = data.as_ref().unwrap().clone();
    for key in path {
        v = v.get(*key).unwrap().clone();
    }
    v.as_str().unwrap().to_string()
}

/// Extract an array from nested JSON path.
pub fn extract_array(data: &Option<serde_json::Value>, path: &[&str]) -> Vec<serde_json::Value> {
    let mut v = data.as_ref().unwrap().clone();
    for key in path {
        v = v.get(*key).unwrap().clone();
    }
    v.as_array().unwrap().clone()
}
