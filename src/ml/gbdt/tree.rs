use serde::{Deserialize, Serialize};

/// A node of a regression tree; the root is `nodes[0]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    /// Rows with `feature <= threshold` (or NaN) go left.
    Split {
        feature: u32,
        threshold: f32,
        left: u32,
        right: u32,
    },
    /// Output already scaled by the learning rate.
    Leaf { value: f32 },
}

/// Regression tree stored as a flat node array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    /// Tree that always predicts `value`.
    pub fn leaf(value: f32) -> Self {
        Self {
            nodes: vec![Node::Leaf { value }],
        }
    }

    /// Predict the tree output for a feature vector.
    pub fn predict(&self, features: &[f32]) -> f32 {
        let mut idx = 0usize;
        loop {
            match self.nodes.get(idx) {
                Some(Node::Leaf { value }) => return *value,
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let value = features.get(*feature as usize).copied().unwrap_or(0.0);
                    idx = if value > *threshold {
                        *right as usize
                    } else {
                        *left as usize
                    };
                }
                None => return 0.0,
            }
        }
    }

    /// Length of the longest root-to-leaf path, in splits.
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match nodes.get(idx) {
                Some(Node::Split { left, right, .. }) => {
                    1 + walk(nodes, *left as usize).max(walk(nodes, *right as usize))
                }
                _ => 0,
            }
        }
        walk(&self.nodes, 0)
    }

    /// Check child links point forward and features fit `feature_len`.
    pub fn validate(&self, feature_len: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("Tree has no nodes".to_string());
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            if let Node::Split {
                feature,
                left,
                right,
                ..
            } = node
            {
                if *feature as usize >= feature_len {
                    return Err(format!(
                        "Node {idx} splits on feature {feature} but vectors have {feature_len}"
                    ));
                }
                for child in [*left as usize, *right as usize] {
                    if child <= idx || child >= self.nodes.len() {
                        return Err(format!("Node {idx} has invalid child {child}"));
                    }
                }
            }
        }
        Ok(())
    }
}
