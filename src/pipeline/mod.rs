pub mod analysis; // Report analysis: model cascade, parsing, heuristic fallback, coercion
