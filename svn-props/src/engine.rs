//! Runs the ordered rule list over a path to produce its final property set.

use crate::rule::{FileContext, Properties, PropertyRule};

pub struct Engine {
    rules: Vec<Box<dyn PropertyRule>>,
}

impl Engine {
    pub fn new(rules: Vec<Box<dyn PropertyRule>>) -> Self {
        Self { rules }
    }

    pub fn compute(&self, ctx: &FileContext) -> Properties {
        let mut props = Properties::new();
        for rule in &self.rules {
            rule.apply(ctx, &mut props);
        }
        props
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{BinarySniffRule, EolStyleRule, ExecutableRule, MimeTypeRule, PROP_EOL_STYLE, PROP_EXECUTABLE};

    #[test]
    fn runs_rules_in_order_and_accumulates_properties() {
        let engine = Engine::new(vec![
            Box::new(ExecutableRule),
            Box::new(BinarySniffRule),
            Box::new(MimeTypeRule),
            Box::new(EolStyleRule),
        ]);

        let ctx = FileContext {
            path: b"deploy.sh",
            executable: true,
            sample: Some(b"#!/bin/sh\necho hi\n"),
        };

        let props = engine.compute(&ctx);
        assert_eq!(props.get(PROP_EXECUTABLE), Some(&"*".to_string()));
        assert_eq!(props.get(PROP_EOL_STYLE), Some(&"native".to_string()));
    }
}
