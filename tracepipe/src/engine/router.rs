use dashmap::DashMap;

/// A routing table of direct bindings: input name -> output name. A direct
/// route bypasses tag matching entirely, unlike the tag-based routing a
/// full engine would also support (and which this crate does not need,
/// since every trace envelope is emitted under the fixed `trace` tag to a
/// single bound output).
#[derive(Default)]
pub struct RouteTable {
    direct: DashMap<String, String>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self {
            direct: DashMap::new(),
        }
    }

    pub fn bind(&self, input_name: &str, output_name: &str) {
        self.direct
            .insert(input_name.to_string(), output_name.to_string());
    }

    pub fn unbind(&self, input_name: &str) {
        self.direct.remove(input_name);
    }

    pub fn route_for(&self, input_name: &str) -> Option<String> {
        self.direct.get(input_name).map(|entry| entry.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binds_and_looks_up_a_direct_route() {
        let table = RouteTable::new();
        table.bind("trace-emitter", "trace-sink");
        assert_eq!(table.route_for("trace-emitter").as_deref(), Some("trace-sink"));
        table.unbind("trace-emitter");
        assert_eq!(table.route_for("trace-emitter"), None);
    }
}
