pub mod chrx;
pub mod core;
pub mod legend;
pub mod qc;
pub mod vcf;
