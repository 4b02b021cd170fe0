//! 集合内请求的依赖图
//!
//! 节点是展开后请求列表中的下标。`dependsOn` 先按 ID、再按名称解析。

use crate::collection::SavedRequest;
use crate::{Result, RunpostError};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct FlowGraph {
    /// 请求下标 -> 其依赖的下标，按声明顺序
    dependencies: Vec<Vec<usize>>,
    /// 依赖排在被依赖者之前，其余保持声明顺序
    order: Vec<usize>,
}

impl FlowGraph {
    pub fn build(requests: &[&SavedRequest]) -> Result<Self> {
        let mut by_id: HashMap<&str, usize> = HashMap::new();
        for (index, request) in requests.iter().enumerate() {
            if by_id.insert(request.id.as_str(), index).is_some() {
                return Err(RunpostError::DuplicateRequestId(request.id.clone()));
            }
        }
        let mut by_name: HashMap<&str, usize> = HashMap::new();
        for (index, request) in requests.iter().enumerate() {
            by_name.entry(request.name.as_str()).or_insert(index);
        }

        let mut dependencies = Vec::with_capacity(requests.len());
        for request in requests {
            let mut resolved = Vec::new();
            for reference in &request.depends_on {
                let target = by_id
                    .get(reference.as_str())
                    .or_else(|| by_name.get(reference.as_str()))
                    .copied()
                    .ok_or_else(|| RunpostError::UnresolvedDependency {
                        request: request.name.clone(),
                        reference: reference.clone(),
                    })?;
                if !resolved.contains(&target) {
                    resolved.push(target);
                }
            }
            dependencies.push(resolved);
        }

        let mut graph = Self {
            dependencies,
            order: Vec::new(),
        };
        graph.order = graph.topological_order(requests)?;
        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    pub fn dependencies(&self, index: usize) -> &[usize] {
        self.dependencies
            .get(index)
            .map(|d| d.as_slice())
            .unwrap_or(&[])
    }

    /// 单轮内的执行顺序
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// 是否有请求声明了依赖
    pub fn has_edges(&self) -> bool {
        self.dependencies.iter().any(|d| !d.is_empty())
    }

    fn topological_order(&self, requests: &[&SavedRequest]) -> Result<Vec<usize>> {
        let mut result = Vec::with_capacity(self.len());
        let mut visited = vec![false; self.len()];
        let mut stack = Vec::new();

        for node in 0..self.len() {
            if !visited[node] {
                self.visit(node, requests, &mut visited, &mut stack, &mut result)?;
            }
        }
        Ok(result)
    }

    fn visit(
        &self,
        node: usize,
        requests: &[&SavedRequest],
        visited: &mut [bool],
        stack: &mut Vec<usize>,
        result: &mut Vec<usize>,
    ) -> Result<()> {
        if let Some(start) = stack.iter().position(|&n| n == node) {
            let mut path: Vec<&str> = stack[start..]
                .iter()
                .map(|&n| requests[n].name.as_str())
                .collect();
            path.push(requests[node].name.as_str());
            return Err(RunpostError::DependencyCycle(path.join(" -> ")));
        }
        if visited[node] {
            return Ok(());
        }

        stack.push(node);
        for &dep in &self.dependencies[node] {
            self.visit(dep, requests, visited, stack, result)?;
        }
        stack.pop();

        visited[node] = true;
        result.push(node);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(requests: &[SavedRequest]) -> Result<FlowGraph> {
        let refs: Vec<&SavedRequest> = requests.iter().collect();
        FlowGraph::build(&refs)
    }

    #[test]
    fn test_independent_requests_keep_declared_order() {
        let requests = vec![
            SavedRequest::new("a", "A", "http://x/a"),
            SavedRequest::new("b", "B", "http://x/b"),
            SavedRequest::new("c", "C", "http://x/c"),
        ];
        let graph = build(&requests).unwrap();
        assert_eq!(graph.order(), &[0, 1, 2]);
        assert!(!graph.has_edges());
    }

    #[test]
    fn test_dependency_moves_before_dependent() {
        let requests = vec![
            SavedRequest::new("a", "A", "http://x/a").depends_on("C"),
            SavedRequest::new("b", "B", "http://x/b"),
            SavedRequest::new("c", "C", "http://x/c"),
        ];
        let graph = build(&requests).unwrap();
        assert_eq!(graph.order(), &[2, 0, 1]);
        assert_eq!(graph.dependencies(0), &[2]);
        assert!(graph.has_edges());
    }

    #[test]
    fn test_reference_by_id_wins_over_name() {
        let requests = vec![
            SavedRequest::new("login", "setup", "http://x/a"),
            SavedRequest::new("setup", "login", "http://x/b"),
            SavedRequest::new("c", "C", "http://x/c").depends_on("setup"),
        ];
        let graph = build(&requests).unwrap();
        assert_eq!(graph.dependencies(2), &[1]);
    }

    #[test]
    fn test_cycle_detected() {
        let requests = vec![
            SavedRequest::new("a", "A", "http://x/a").depends_on("b"),
            SavedRequest::new("b", "B", "http://x/b").depends_on("c"),
            SavedRequest::new("c", "C", "http://x/c").depends_on("a"),
        ];
        match build(&requests) {
            Err(RunpostError::DependencyCycle(path)) => assert_eq!(path, "A -> B -> C -> A"),
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_self_dependency_is_cycle() {
        let requests = vec![SavedRequest::new("a", "A", "http://x/a").depends_on("a")];
        assert!(matches!(
            build(&requests),
            Err(RunpostError::DependencyCycle(_))
        ));
    }

    #[test]
    fn test_unresolved_reference() {
        let requests = vec![SavedRequest::new("a", "A", "http://x/a").depends_on("ghost")];
        let err = build(&requests).unwrap_err();
        assert!(err.is_configuration());
        assert!(matches!(
            err,
            RunpostError::UnresolvedDependency { ref reference, .. } if reference == "ghost"
        ));
    }

    #[test]
    fn test_duplicate_id() {
        let requests = vec![
            SavedRequest::new("a", "A", "http://x/a"),
            SavedRequest::new("a", "B", "http://x/b"),
        ];
        assert!(matches!(
            build(&requests),
            Err(RunpostError::DuplicateRequestId(id)) if id == "a"
        ));
    }
}
