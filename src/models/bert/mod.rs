/// BERT for virality classification (text plus side features)
pub mod virality;
